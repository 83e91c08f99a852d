/// Storage wiped before a restart when a reset is requested.
pub const RESET_PATHS: [&str; 4] = [
    "/data/b2g/mozilla",
    "/data/local/storage/persistent",
    "/data/local/indexedDB",
    "/data/local/OfflineCache",
];

pub const SOURCES_XML_PATH: &str = "/system/sources.xml";
/// Settings app package, carrying the gaia commit. User builds keep it under
/// `/data`, engineering builds under `/system`.
pub const SETTINGS_APP_ZIPS: [&str; 2] = [
    "/data/local/webapps/settings.gaiamobile.org/application.zip",
    "/system/b2g/webapps/settings.gaiamobile.org/application.zip",
];

/// Paths handed to destructive device commands must be absolute, free of
/// `..` segments, and not the root itself.
pub fn validate_device_path(path: &str) -> Result<(), String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err("device path is required".to_string());
    }
    if !trimmed.starts_with('/') {
        return Err(format!("device path must be absolute: {trimmed}"));
    }
    if trimmed.contains('\0') || trimmed.contains(char::is_whitespace) {
        return Err(format!("device path contains invalid characters: {trimmed:?}"));
    }
    if trimmed.trim_end_matches('/').is_empty() {
        return Err("device path must not be root".to_string());
    }
    if trimmed.split('/').any(|segment| segment == "..") {
        return Err(format!("device path must not contain '..' segments: {trimmed}"));
    }
    Ok(())
}

pub fn device_parent_dir(device_path: &str) -> String {
    let path = device_path.trim().trim_end_matches('/');
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

pub fn join_device_path(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
}
