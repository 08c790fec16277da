//! Queued delivery of status transitions
//!
//! Any thread may hold a [`StatusHandle`]. Requests are pushed onto an
//! unbounded FIFO channel and applied by the single [`StatusConsumer`] that
//! lives on the presentation thread, so phases are never skipped, reordered
//! or applied concurrently.

use tokio::sync::mpsc;
use tracing::debug;

use super::{Placement, StatusMachine, StatusSurface, StatusTransition, StatusView};
use crate::message_bus::{Event, MessageBus};

/// Transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCommand {
    Create,
    Advance,
    ForceClose,
}

/// Create a connected handle/consumer pair
pub fn channel(machine: StatusMachine, placement: Placement) -> (StatusHandle, StatusConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        StatusHandle { tx },
        StatusConsumer {
            machine,
            placement,
            rx,
            bus: None,
        },
    )
}

/// Cloneable request side
#[derive(Debug, Clone)]
pub struct StatusHandle {
    tx: mpsc::UnboundedSender<StatusCommand>,
}

impl StatusHandle {
    pub fn create(&self) {
        self.send(StatusCommand::Create);
    }

    pub fn advance(&self) {
        self.send(StatusCommand::Advance);
    }

    pub fn force_close(&self) {
        self.send(StatusCommand::ForceClose);
    }

    fn send(&self, command: StatusCommand) {
        // A closed consumer means the presentation thread is gone; there is
        // nothing left to show the status on.
        if self.tx.send(command).is_err() {
            debug!("Status consumer gone, dropped {:?}", command);
        }
    }
}

/// Presentation-thread side
pub struct StatusConsumer {
    machine: StatusMachine,
    placement: Placement,
    rx: mpsc::UnboundedReceiver<StatusCommand>,
    bus: Option<MessageBus>,
}

impl StatusConsumer {
    /// Publish a `StatusChanged` event for every visible change
    pub fn with_bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn machine(&self) -> &StatusMachine {
        &self.machine
    }

    /// Apply one request to the machine and the surface
    pub fn apply(&mut self, command: StatusCommand, surface: &mut dyn StatusSurface) -> StatusTransition {
        let transition = match command {
            StatusCommand::Create => self.machine.create(),
            StatusCommand::Advance => self.machine.advance(),
            StatusCommand::ForceClose => self.machine.force_close(),
        };

        match &transition {
            StatusTransition::Shown { label, .. } => {
                let view = StatusView {
                    label: label.clone(),
                    position: self.placement.position(surface.geometry(label)),
                };
                surface.show(&view);
            }
            StatusTransition::Hidden => surface.hide(),
            StatusTransition::Unchanged => {}
        }

        debug!("Status {:?} -> {:?}", command, transition);
        transition
    }

    /// Apply every queued request without waiting
    pub fn drain(&mut self, surface: &mut dyn StatusSurface) -> Vec<StatusTransition> {
        let mut applied = Vec::new();
        while let Ok(command) = self.rx.try_recv() {
            applied.push(self.apply(command, surface));
        }
        applied
    }

    /// Wait for the next request.
    ///
    /// Returns `None` once every handle has been dropped.
    pub async fn recv(&mut self) -> Option<StatusCommand> {
        self.rx.recv().await
    }

    /// Apply a request and publish the change on the bus
    pub async fn apply_and_publish(
        &mut self,
        command: StatusCommand,
        surface: &mut dyn StatusSurface,
    ) -> StatusTransition {
        let transition = self.apply(command, surface);
        if let Some(bus) = &self.bus {
            if transition != StatusTransition::Unchanged {
                bus.publish(Event::StatusChanged {
                    phase: transition.label().map(String::from),
                })
                .await;
            }
        }
        transition
    }
}
