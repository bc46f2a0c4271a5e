//! Bridge channel management.
//!
//! Groups the channels connecting the Skype session, the relay task, the
//! Matrix sync loop and the outbound command task.

use tokio::sync::{mpsc, watch};

use crate::common::{BridgeCommand, SessionEvent};

/// Channels for the Skype side.
pub struct SkypeChannels {
    /// Sender handed to the Skype event stream.
    pub events_tx: mpsc::UnboundedSender<SessionEvent>,
    /// Receiver for puppet commands (outbound task listens).
    pub command_rx: mpsc::UnboundedReceiver<BridgeCommand>,
}

/// Channels for the Matrix side.
pub struct MatrixChannels {
    /// Receiver for Skype events (relay task listens).
    pub events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    /// Sender for puppet commands (sync loop sends).
    pub command_tx: mpsc::UnboundedSender<BridgeCommand>,
}

/// Control channels for shutdown coordination.
pub struct ControlChannels {
    /// Sender to trigger shutdown.
    pub shutdown_tx: watch::Sender<bool>,
    /// Receiver template; clone one per task.
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Bundle of all channels created by the bridge.
pub struct ChannelBundle {
    pub skype: SkypeChannels,
    pub matrix: MatrixChannels,
    pub control: ControlChannels,
}

impl ChannelBundle {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            skype: SkypeChannels {
                events_tx,
                command_rx,
            },
            matrix: MatrixChannels {
                events_rx,
                command_tx,
            },
            control: ControlChannels {
                shutdown_tx,
                shutdown_rx,
            },
        }
    }
}

impl Default for ChannelBundle {
    fn default() -> Self {
        Self::new()
    }
}
