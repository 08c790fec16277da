//! Pipeline status state machine
//!
//! Tracks which phase of the fixed, ordered phase list is on screen. The
//! machine itself only keeps an index; showing, hiding and positioning the
//! surface is delegated to a [`StatusSurface`] implementation owned by the
//! presentation thread.
//!
//! Transitions:
//!
//! - `create`: any state → first phase, surface shown
//! - `advance`: phase *i* → phase *i+1*; past the last phase → idle, surface hidden
//! - `force_close`: any state → idle, surface hidden
//!
//! Requests from other threads go through [`controller::StatusHandle`], which
//! queues them so they are applied one at a time, in request order.

pub mod controller;

pub use controller::{StatusCommand, StatusConsumer, StatusHandle};

use crate::config::StatusConfig;

/// Size information the surface reports for placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceGeometry {
    pub screen_height: i32,
    pub surface_height: i32,
}

/// Top-left corner of the surface in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenPosition {
    pub x: i32,
    pub y: i32,
}

/// What the surface should display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub label: String,
    pub position: ScreenPosition,
}

/// Presentation collaborator that renders the status surface
pub trait StatusSurface {
    /// Screen size and the surface height needed to display `label`,
    /// queried on every transition so the surface is re-pinned after the
    /// label changes
    fn geometry(&self, label: &str) -> SurfaceGeometry;

    /// Show the surface (or update it) with a new label and position
    fn show(&mut self, view: &StatusView);

    /// Hide the surface
    fn hide(&mut self);
}

/// Result of a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusTransition {
    /// Now showing the phase at `index`
    Shown { index: usize, label: String },

    /// Surface hidden, machine idle
    Hidden,

    /// Request had no effect (advance while idle)
    Unchanged,
}

impl StatusTransition {
    /// Label now on screen, `None` when hidden or unchanged
    pub fn label(&self) -> Option<&str> {
        match self {
            StatusTransition::Shown { label, .. } => Some(label),
            _ => None,
        }
    }
}

/// Surface placement: fixed left margin, pinned above the bottom edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub margin_left: i32,
    pub margin_bottom: i32,
}

impl Placement {
    pub fn position(&self, geometry: SurfaceGeometry) -> ScreenPosition {
        ScreenPosition {
            x: self.margin_left,
            y: geometry.screen_height - geometry.surface_height - self.margin_bottom,
        }
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            margin_left: 60,
            margin_bottom: 75,
        }
    }
}

/// Ordered phase tracker
#[derive(Debug, Clone)]
pub struct StatusMachine {
    phases: Vec<String>,
    current: Option<usize>,
}

impl StatusMachine {
    /// Create an idle machine over `phases`
    pub fn new(phases: Vec<String>) -> Self {
        Self {
            phases,
            current: None,
        }
    }

    pub fn from_config(config: &StatusConfig) -> Self {
        Self::new(config.phases.clone())
    }

    pub fn phases(&self) -> &[String] {
        &self.phases
    }

    /// Index of the phase on screen, `None` when idle
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Label of the phase on screen, `None` when idle
    pub fn current_label(&self) -> Option<&str> {
        self.current.map(|i| self.phases[i].as_str())
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    /// Show the first phase, restarting if a run was already on screen
    pub fn create(&mut self) -> StatusTransition {
        self.enter(0)
    }

    /// Move to the next phase, or hide after the last one
    pub fn advance(&mut self) -> StatusTransition {
        match self.current {
            None => StatusTransition::Unchanged,
            Some(i) => self.enter(i + 1),
        }
    }

    /// Hide immediately, whatever the current phase
    pub fn force_close(&mut self) -> StatusTransition {
        self.current = None;
        StatusTransition::Hidden
    }

    fn enter(&mut self, index: usize) -> StatusTransition {
        match self.phases.get(index) {
            Some(label) => {
                self.current = Some(index);
                StatusTransition::Shown {
                    index,
                    label: label.clone(),
                }
            }
            None => {
                self.current = None;
                StatusTransition::Hidden
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> StatusMachine {
        StatusMachine::new(vec!["A".into(), "B".into(), "C".into()])
    }

    #[test]
    fn test_full_run() {
        let mut machine = abc();
        assert!(machine.is_idle());

        assert_eq!(machine.create().label(), Some("A"));
        assert_eq!(machine.advance().label(), Some("B"));
        assert_eq!(machine.advance().label(), Some("C"));
        assert_eq!(machine.advance(), StatusTransition::Hidden);
        assert!(machine.is_idle());
    }

    #[test]
    fn test_force_close_from_any_phase() {
        for steps in 0..3 {
            let mut machine = abc();
            machine.create();
            for _ in 0..steps {
                machine.advance();
            }
            assert!(!machine.is_idle());
            assert_eq!(machine.force_close(), StatusTransition::Hidden);
            assert!(machine.is_idle());
        }
    }

    #[test]
    fn test_advance_while_idle_is_ignored() {
        let mut machine = abc();
        assert_eq!(machine.advance(), StatusTransition::Unchanged);
        assert!(machine.is_idle());
    }

    #[test]
    fn test_create_restarts() {
        let mut machine = abc();
        machine.create();
        machine.advance();
        assert_eq!(machine.create().label(), Some("A"));
        assert_eq!(machine.current_index(), Some(0));
    }

    #[test]
    fn test_placement() {
        let placement = Placement::default();
        let position = placement.position(SurfaceGeometry {
            screen_height: 1080,
            surface_height: 145,
        });
        assert_eq!(position, ScreenPosition { x: 60, y: 860 });
    }
}
