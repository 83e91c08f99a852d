use std::path::Path;

use tracing::{info, warn};

use crate::app::adb::paths::join_device_path;
use crate::app::config::Testvars;
use crate::app::device::DeviceController;
use crate::app::error::ProbeError;
use crate::app::session::gaia::Gaia;

/// One-time data seeding that runs during setup, never per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateStep {
    Contacts(usize),
    Photos(usize),
    Music(usize),
    Videos(usize),
}

/// Where a media kind lives on the device and how copies are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MediaTarget {
    seed_key: &'static str,
    dir: &'static str,
    prefix: &'static str,
}

impl PopulateStep {
    pub fn count(&self) -> usize {
        match self {
            PopulateStep::Contacts(n)
            | PopulateStep::Photos(n)
            | PopulateStep::Music(n)
            | PopulateStep::Videos(n) => *n,
        }
    }

    fn media_target(&self) -> Option<MediaTarget> {
        match self {
            PopulateStep::Contacts(_) => None,
            PopulateStep::Photos(_) => Some(MediaTarget {
                seed_key: "photo",
                dir: "/sdcard/DCIM/100MZLLA",
                prefix: "IMG",
            }),
            PopulateStep::Music(_) => Some(MediaTarget {
                seed_key: "music",
                dir: "/sdcard",
                prefix: "MUS",
            }),
            PopulateStep::Videos(_) => Some(MediaTarget {
                seed_key: "video",
                dir: "/sdcard/DCIM/100MZLLA",
                prefix: "VID",
            }),
        }
    }
}

pub fn populate(
    step: PopulateStep,
    gaia: &mut Gaia<'_>,
    device: &mut dyn DeviceController,
    testvars: &Testvars,
    trace_id: &str,
) -> Result<(), ProbeError> {
    match step.media_target() {
        None => add_contacts(step.count(), gaia, trace_id),
        Some(target) => match testvars.seed_path(target.seed_key) {
            Some(seed) => push_media(&target, &seed, step.count(), device, trace_id),
            None => {
                warn!(
                    trace_id = %trace_id,
                    kind = target.seed_key,
                    "no seed file under testvars 'populate', skipping"
                );
                Ok(())
            }
        },
    }
}

fn add_contacts(count: usize, gaia: &mut Gaia<'_>, trace_id: &str) -> Result<(), ProbeError> {
    info!(trace_id = %trace_id, count, "adding contacts");
    for index in 0..count {
        let inserted = gaia.insert_contact("testcontact", &index.to_string(), &format!("1-555-522-{index}"))?;
        if !inserted {
            return Err(ProbeError::Populate(format!("contact {index} was not saved")));
        }
    }
    Ok(())
}

fn copy_name(prefix: &str, index: usize, extension: &str) -> String {
    if extension.is_empty() {
        format!("{prefix}_{index:04}")
    } else {
        format!("{prefix}_{index:04}.{extension}")
    }
}

fn push_media(
    target: &MediaTarget,
    seed: &Path,
    count: usize,
    device: &mut dyn DeviceController,
    trace_id: &str,
) -> Result<(), ProbeError> {
    let existing = device
        .list_items(target.dir)?
        .iter()
        .filter(|name| name.starts_with(target.prefix))
        .count();
    if existing >= count {
        info!(trace_id = %trace_id, dir = target.dir, existing, "media already populated");
        return Ok(());
    }

    let extension = seed
        .extension()
        .map(|ext| ext.to_string_lossy().to_string())
        .unwrap_or_default();
    let remote_seed = join_device_path(target.dir, &copy_name("seed", 0, &extension));
    info!(trace_id = %trace_id, dir = target.dir, count, "adding {}", target.seed_key);
    device.push_file(seed, &remote_seed)?;
    for index in existing..count {
        let copy = join_device_path(target.dir, &copy_name(target.prefix, index + 1, &extension));
        device.copy_on_device(&remote_seed, &copy)?;
    }
    device.remove_path(&remote_seed)?;
    Ok(())
}
