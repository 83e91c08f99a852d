use std::time::{Duration, Instant};

use tracing::debug;

use crate::app::cleanup::best_effort;
use crate::app::config::FpsSettings;
use crate::app::error::ProbeError;
use crate::app::models::Metrics;
use crate::app::probe::gestures::{smooth_scroll, ScrollGesture};
use crate::app::session::gaia::Gaia;
use crate::app::session::{ElementRef, Locator, RemoteSession, SessionError};
use crate::app::wait::{Wait, WaitError};

pub const SCROLL_METRICS: [&str; 1] = ["fps"];

/// Where and how far to scroll inside an app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollTarget {
    pub locator: &'static str,
    pub gesture: ScrollGesture,
}

pub fn wait_for_element(
    session: &mut dyn RemoteSession,
    selector: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<ElementRef, ProbeError> {
    Wait::new(timeout)
        .poll_interval(poll_interval)
        .ignoring(|err: &SessionError| matches!(err, SessionError::NoSuchElement(_)))
        .until(&format!("element {selector} not found"), || {
            session.find_element(Locator::Css(selector)).map(Some)
        })
        .map_err(|err| match err {
            WaitError::Aborted(err) => ProbeError::Session(err),
            expired @ WaitError::Timeout { .. } => ProbeError::Timeout(expired.to_string()),
        })
}

/// Launches the app, scrolls the target while counting frames for one
/// sampling period, then kills the app.
pub fn scroll_once(
    gaia: &mut Gaia<'_>,
    app_name: &str,
    target: &ScrollTarget,
    fps: &FpsSettings,
    search_timeout: Duration,
    poll_interval: Duration,
    trace_id: &str,
) -> Result<Metrics, ProbeError> {
    let fps_error = || ProbeError::Fps {
        app: app_name.to_string(),
    };
    let record = gaia.launch(app_name)?.ok_or_else(|| ProbeError::AppLaunch {
        app: app_name.to_string(),
    })?;
    gaia.enter_app(&record)?;
    let element = wait_for_element(gaia.session(), target.locator, search_timeout, poll_interval)?;

    if !gaia.start_fps(fps.sample_hz)? {
        return Err(fps_error());
    }
    let started = Instant::now();
    if let Err(err) = smooth_scroll(gaia.session(), &element, &target.gesture) {
        // The meter lives in the app frame until the app is killed.
        best_effort("stop fps", trace_id, || gaia.stop_fps().map(|_| ()));
        return Err(err.into());
    }
    std::thread::sleep(fps.sample_period().saturating_sub(started.elapsed()));
    let reading = gaia.stop_fps()?.ok_or_else(fps_error)?;
    debug!(app = %app_name, fps = reading.fps, frames = reading.number_frames, "fps sample");

    gaia.kill(&record.origin)?;
    Ok(Metrics::from([("fps".to_string(), reading.fps)]))
}
