use crate::app::error::ProbeError;
use crate::app::models::Metrics;
use crate::app::session::gaia::Gaia;

pub const LAUNCH_METRICS: [&str; 1] = ["cold_load_time"];

const LOAD_TIME_FIELDS: [&str; 2] = ["cold_load_time", "warm_load_time"];

/// Launches `app_name` once, reads its load times and kills it again.
pub fn launch_once(gaia: &mut Gaia<'_>, app_name: &str) -> Result<Metrics, ProbeError> {
    let record = gaia.launch(app_name)?.ok_or_else(|| ProbeError::AppLaunch {
        app: app_name.to_string(),
    })?;
    let metrics: Metrics = LOAD_TIME_FIELDS
        .iter()
        .filter_map(|field| record.metric(field).map(|value| (field.to_string(), value)))
        .collect();
    gaia.kill(&record.origin)?;
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::FakeSession;
    use serde_json::json;

    #[test]
    fn reads_load_time_and_kills_by_origin() {
        let mut session = FakeSession::new().respond(|script, args| {
            if script.contains("launch_app(") {
                return Ok(json!({ "origin": "app://clock.gaiamobile.org", "cold_load_time": 812 }));
            }
            assert!(script.contains("GaiaHarness.kill(arguments[0])"));
            assert_eq!(args[0], json!("app://clock.gaiamobile.org"));
            Ok(json!(true))
        });
        let metrics = launch_once(&mut Gaia::new(&mut session), "Clock").expect("metrics");
        assert_eq!(metrics.get("cold_load_time"), Some(&812.0));
        assert_eq!(session.scripts.len(), 2);
    }

    #[test]
    fn missing_record_is_a_launch_error() {
        let mut session = FakeSession::new().respond(|_, _| Ok(json!(null)));
        let err = launch_once(&mut Gaia::new(&mut session), "Clock").expect_err("no record");
        assert_eq!(err.to_string(), "error launching app 'Clock'");
        assert_eq!(session.scripts.len(), 1);
    }

    #[test]
    fn warm_launch_has_no_cold_metric() {
        let mut session = FakeSession::new().respond(|script, _| {
            if script.contains("launch_app(") {
                return Ok(json!({ "origin": "app://clock.gaiamobile.org", "warm_load_time": 301 }));
            }
            Ok(json!(true))
        });
        let metrics = launch_once(&mut Gaia::new(&mut session), "Clock").expect("metrics");
        assert_eq!(metrics.get("cold_load_time"), None);
        assert_eq!(metrics.get("warm_load_time"), Some(&301.0));
    }
}
