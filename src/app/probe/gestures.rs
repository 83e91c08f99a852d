use std::time::Duration;

use crate::app::session::{ElementRef, PointerStep, RemoteSession, SessionError};

pub const DEFAULT_INCREMENT: u32 = 100;
pub const DEFAULT_STEP_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Negative,
    Positive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollGesture {
    pub axis: Axis,
    pub direction: Direction,
    pub length: u32,
    pub increment: u32,
    pub wait: Duration,
    pub scroll_back: bool,
}

impl ScrollGesture {
    pub const fn new(axis: Axis, direction: Direction, length: u32) -> Self {
        Self {
            axis,
            direction,
            length,
            increment: DEFAULT_INCREMENT,
            wait: DEFAULT_STEP_WAIT,
            scroll_back: false,
        }
    }

    fn offset(&self) -> (i64, i64) {
        let step = i64::from(self.increment.max(1));
        let signed = match self.direction {
            Direction::Negative => -step,
            Direction::Positive => step,
        };
        match self.axis {
            Axis::X => (signed, 0),
            Axis::Y => (0, signed),
        }
    }

    /// Press on `start`, move by one increment per step until `length` is
    /// covered (then back again when requested) and release.
    pub fn steps(&self, start: &ElementRef) -> Vec<PointerStep> {
        let increment = self.increment.max(1);
        let (x, y) = self.offset();
        let mut steps = vec![PointerStep::MoveToElement(start.clone()), PointerStep::Down];
        let mut current = 0;
        while current < self.length {
            current += increment;
            steps.push(PointerStep::MoveBy { x, y });
            steps.push(PointerStep::Pause(self.wait));
        }
        if self.scroll_back {
            while current > 0 {
                current = current.saturating_sub(increment);
                steps.push(PointerStep::MoveBy { x: -x, y: -y });
                steps.push(PointerStep::Pause(self.wait));
            }
        }
        steps.push(PointerStep::Up);
        steps
    }
}

pub fn smooth_scroll(
    session: &mut dyn RemoteSession,
    start: &ElementRef,
    gesture: &ScrollGesture,
) -> Result<(), SessionError> {
    session.perform_touch_actions(&gesture.steps(start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moves(steps: &[PointerStep]) -> Vec<(i64, i64)> {
        steps
            .iter()
            .filter_map(|step| match step {
                PointerStep::MoveBy { x, y } => Some((*x, *y)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn vertical_scroll_covers_length_in_increments() {
        let start = ElementRef("list".to_string());
        let steps = ScrollGesture::new(Axis::Y, Direction::Negative, 250).steps(&start);
        assert_eq!(steps[0], PointerStep::MoveToElement(start));
        assert_eq!(steps[1], PointerStep::Down);
        assert_eq!(steps.last(), Some(&PointerStep::Up));
        assert_eq!(moves(&steps), vec![(0, -100), (0, -100), (0, -100)]);
    }

    #[test]
    fn scroll_back_returns_to_origin() {
        let start = ElementRef("carousel".to_string());
        let gesture = ScrollGesture {
            scroll_back: true,
            increment: 200,
            ..ScrollGesture::new(Axis::X, Direction::Positive, 400)
        };
        let moves = moves(&gesture.steps(&start));
        assert_eq!(moves, vec![(200, 0), (200, 0), (-200, 0), (-200, 0)]);
        assert_eq!(moves.iter().map(|(x, _)| x).sum::<i64>(), 0);
    }

    #[test]
    fn zero_length_only_presses_and_releases() {
        let start = ElementRef("body".to_string());
        let steps = ScrollGesture::new(Axis::Y, Direction::Positive, 0).steps(&start);
        assert_eq!(steps.len(), 3);
    }
}
