use crate::app::probe::gestures::{Axis, Direction, ScrollGesture};
use crate::app::probe::populate::PopulateStep;

/// How one app is measured: where to scroll, what it needs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppProfile {
    pub name: &'static str,
    pub scroll_locator: &'static str,
    pub gesture: ScrollGesture,
    pub requires_connection: bool,
    pub populate: Option<PopulateStep>,
}

impl AppProfile {
    const fn new(name: &'static str, scroll_locator: &'static str, gesture: ScrollGesture) -> Self {
        Self {
            name,
            scroll_locator,
            gesture,
            requires_connection: false,
            populate: None,
        }
    }

    const fn online(mut self) -> Self {
        self.requires_connection = true;
        self
    }

    const fn populated(mut self, step: PopulateStep) -> Self {
        self.populate = Some(step);
        self
    }

    const fn scroll_back(mut self) -> Self {
        self.gesture.scroll_back = true;
        self
    }
}

const DOWN: Direction = Direction::Negative;

pub const DEFAULT_PROFILE: AppProfile =
    AppProfile::new("default", "body", ScrollGesture::new(Axis::Y, DOWN, 1000));

const PROFILES: [AppProfile; 10] = [
    AppProfile::new("Homescreen", "#icongrid", ScrollGesture::new(Axis::X, DOWN, 960)).scroll_back(),
    AppProfile::new("Contacts", "#groups-container", ScrollGesture::new(Axis::Y, DOWN, 5000))
        .scroll_back()
        .populated(PopulateStep::Contacts(200)),
    AppProfile::new("Gallery", "#thumbnails", ScrollGesture::new(Axis::Y, DOWN, 3000))
        .scroll_back()
        .populated(PopulateStep::Photos(100)),
    AppProfile::new("Music", "#views-tiles", ScrollGesture::new(Axis::Y, DOWN, 3000))
        .scroll_back()
        .populated(PopulateStep::Music(100)),
    AppProfile::new("Video", "#thumbnails", ScrollGesture::new(Axis::Y, DOWN, 2000))
        .scroll_back()
        .populated(PopulateStep::Videos(20)),
    AppProfile::new("Settings", "#root", ScrollGesture::new(Axis::Y, DOWN, 1500)).scroll_back(),
    AppProfile::new("Messages", "#threads-container", ScrollGesture::new(Axis::Y, DOWN, 1500)),
    AppProfile::new("Email", "#cards", ScrollGesture::new(Axis::Y, DOWN, 1500)).online(),
    AppProfile::new("Browser", "#top-sites", ScrollGesture::new(Axis::Y, DOWN, 1500)).online(),
    AppProfile::new("Marketplace", "#page", ScrollGesture::new(Axis::Y, DOWN, 3000)).online(),
];

/// Case-insensitive lookup, falling back to [`DEFAULT_PROFILE`].
pub fn profile_for(app_name: &str) -> AppProfile {
    let wanted = app_name.trim();
    PROFILES
        .iter()
        .find(|profile| profile.name.eq_ignore_ascii_case(wanted))
        .copied()
        .unwrap_or(DEFAULT_PROFILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let profile = profile_for("gallery");
        assert_eq!(profile.name, "Gallery");
        assert_eq!(profile.scroll_locator, "#thumbnails");
        assert_eq!(profile.populate, Some(PopulateStep::Photos(100)));
    }

    #[test]
    fn unknown_apps_use_default() {
        let profile = profile_for("Calculator");
        assert_eq!(profile, DEFAULT_PROFILE);
        assert_eq!(profile.scroll_locator, "body");
        assert_eq!(profile.gesture.axis, Axis::Y);
        assert_eq!(profile.gesture.length, 1000);
        assert!(!profile.requires_connection);
        assert_eq!(profile.populate, None);
    }

    #[test]
    fn network_apps_are_flagged() {
        for name in ["Email", "Browser", "Marketplace"] {
            assert!(profile_for(name).requires_connection, "{name}");
        }
        assert!(!profile_for("Settings").requires_connection);
    }

    #[test]
    fn names_are_unique() {
        for (i, a) in PROFILES.iter().enumerate() {
            for b in PROFILES.iter().skip(i + 1) {
                assert!(!a.name.eq_ignore_ascii_case(b.name));
            }
        }
    }
}
