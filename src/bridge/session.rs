//! Per-connection state shared by the inbound and outbound lanes.

use std::sync::Arc;

use crate::bridge::directory::ContactDirectory;
use crate::bridge::echo::EchoSuppressor;
use crate::bridge::markup::MarkupConverter;
use crate::skype::SkypeApi;

/// A connected Skype session with its contact list and pending self-sends.
pub struct Session {
    pub api: Arc<dyn SkypeApi>,
    pub directory: ContactDirectory,
    pub suppressor: Arc<EchoSuppressor>,
    pub markup: MarkupConverter,
}

impl Session {
    pub fn new(api: Arc<dyn SkypeApi>, directory: ContactDirectory) -> Self {
        Self {
            api,
            directory,
            suppressor: Arc::new(EchoSuppressor::new()),
            markup: MarkupConverter::new(),
        }
    }
}
