//! Camera motion state carried between frames for history reprojection.

use glam::Mat4;

/// Previous and current view-projection of one camera.
///
/// `begin_frame` stores the current matrix; `commit` runs only after the
/// temporal blend of the frame was recorded, so the previous matrix seen by
/// frame N is always the current matrix of the last frame that committed.
#[derive(Clone, Debug, PartialEq)]
pub struct TemporalState {
    previous: Option<Mat4>,
    current: Mat4,
    history_valid: bool,
}

impl Default for TemporalState {
    fn default() -> Self {
        Self {
            previous: None,
            current: Mat4::IDENTITY,
            history_valid: false,
        }
    }
}

impl TemporalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_frame(&mut self, view_proj: Mat4) {
        self.current = view_proj;
    }

    pub fn current(&self) -> Mat4 {
        self.current
    }

    pub fn previous(&self) -> Option<Mat4> {
        self.previous
    }

    /// True when the history target holds a previous frame's blended result.
    pub fn history_valid(&self) -> bool {
        self.history_valid && self.previous.is_some()
    }

    /// Matrix handed to the blend pass. Falls back to the current matrix
    /// while history is invalid.
    pub fn reprojection_matrix(&self) -> Mat4 {
        match self.previous {
            Some(previous) if self.history_valid => previous,
            _ => self.current,
        }
    }

    pub fn commit(&mut self) {
        self.previous = Some(self.current);
        self.history_valid = true;
    }

    /// Called when the history target was (re)allocated.
    pub fn invalidate_history(&mut self) {
        self.history_valid = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn vp(x: f32) -> Mat4 {
        Mat4::from_translation(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_first_frame_uses_current() {
        let mut t = TemporalState::new();
        t.begin_frame(vp(1.0));
        assert!(!t.history_valid());
        assert_eq!(t.reprojection_matrix(), vp(1.0));
    }

    #[test]
    fn test_one_frame_lag() {
        let mut t = TemporalState::new();
        for i in 0..5 {
            t.begin_frame(vp(i as f32));
            if i > 0 {
                assert_eq!(t.reprojection_matrix(), vp((i - 1) as f32));
            }
            t.commit();
        }
    }

    #[test]
    fn test_uncommitted_frame_keeps_previous() {
        let mut t = TemporalState::new();
        t.begin_frame(vp(1.0));
        t.commit();
        t.begin_frame(vp(2.0));
        t.begin_frame(vp(3.0));
        assert_eq!(t.reprojection_matrix(), vp(1.0));
    }

    #[test]
    fn test_invalidated_history() {
        let mut t = TemporalState::new();
        t.begin_frame(vp(1.0));
        t.commit();
        t.begin_frame(vp(2.0));
        t.invalidate_history();
        assert!(!t.history_valid());
        assert_eq!(t.reprojection_matrix(), vp(2.0));
        t.commit();
        assert!(t.history_valid());
    }
}
