use log::debug;
use tokio::sync::mpsc::Receiver;

use crate::{
    ConnectionSettings, InputMapping, LexiconManager, ManagerMessage, ManagerOutputMessage,
    PollSettings,
};

/// Build a [`LexiconManager`] instance.
///
/// ```
/// use lexicon_av::{ConnectionSettings, InputMapping, LexiconManagerBuilder, PollSettings};
/// use tokio::sync::mpsc;
///
/// let (to_manager_tx, to_manager_rx) = mpsc::channel(32);
///
/// let (mut manager, mut from_manager_rx) =
///     LexiconManagerBuilder::new(ConnectionSettings::new("10.0.0.150"), to_manager_rx)
///         .with_poll_settings(PollSettings {
///             poll_audio_attributes: false,
///             ..Default::default()
///         })
///         .with_input_mapping(InputMapping::from_json(r#"{ "RADIO": "DAB" }"#).unwrap())
///         .build();
/// ```
pub struct LexiconManagerBuilder {
    settings: ConnectionSettings,
    poll_settings: PollSettings,
    inputs: InputMapping,
    command_receiver: Receiver<ManagerMessage>,
}

impl LexiconManagerBuilder {
    pub fn new(settings: ConnectionSettings, command_receiver: Receiver<ManagerMessage>) -> Self {
        LexiconManagerBuilder {
            settings,
            poll_settings: PollSettings::default(),
            inputs: InputMapping::default(),
            command_receiver,
        }
    }

    /// Override the default poll cadence, timeouts, and boot windows.
    pub fn with_poll_settings(mut self, poll_settings: PollSettings) -> Self {
        debug!("Builder is overriding poll settings: {:?}", poll_settings);

        self.poll_settings = poll_settings;

        self
    }

    /// Use custom display names for the receiver's inputs.
    pub fn with_input_mapping(mut self, inputs: InputMapping) -> Self {
        debug!("Builder is overriding input mapping: {:?}", inputs);

        self.inputs = inputs;

        self
    }

    pub fn build(self) -> (LexiconManager, Receiver<ManagerOutputMessage>) {
        debug!("Builder is instantiating a LexiconManager instance");

        LexiconManager::with_parts(
            self.settings,
            self.poll_settings,
            self.inputs,
            self.command_receiver,
        )
    }
}
