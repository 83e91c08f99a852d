use std::path::Path;

pub const SERIAL_ENV: &str = "ANDROID_SERIAL";

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|candidate| candidate.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

pub fn resolve_adb_program(configured: &str) -> String {
    let normalized = normalize_command_path(configured);
    if normalized.is_empty() {
        "adb".to_string()
    } else {
        normalized
    }
}

/// Explicit serial first, then `ANDROID_SERIAL`; blank values count as unset.
pub fn resolve_serial(explicit: Option<&str>, from_env: Option<String>) -> Option<String> {
    explicit
        .map(str::to_string)
        .or(from_env)
        .map(|serial| serial.trim().to_string())
        .filter(|serial| !serial.is_empty())
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("adb command is empty".to_string());
    }
    if !program.contains(std::path::MAIN_SEPARATOR) && !program.contains('/') {
        // Bare names are resolved through PATH at spawn time.
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("adb path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err(format!("adb executable not found at {program}"));
    }
    Ok(())
}
