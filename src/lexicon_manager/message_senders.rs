use log::warn;

use crate::ManagerOutputMessage;

use super::LexiconManager;

// ------------------------------------------------------------------------------------------------
// Send messages to the caller.
// ------------------------------------------------------------------------------------------------

impl LexiconManager {
    /// Send a `ManagerOutputMessage` back to the caller.
    pub(crate) async fn send_out(&self, message: ManagerOutputMessage) -> Result<(), ()> {
        self.output_tx.send(message).await.map_err(|_| {
            warn!("Output channel unexpectedly closed");
        })
    }
}
