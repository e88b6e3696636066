use crate::ManagerOutputMessage;

use super::LexiconManager;

// ------------------------------------------------------------------------------------------------
// Emit various ManagerOutputMessages to the caller.
// ------------------------------------------------------------------------------------------------

impl LexiconManager {
    /// Emit all current receiver details to the caller.
    pub(crate) async fn emit_all_state(&mut self) {
        self.emit_receiver_state().await;
        self.emit_poll_phase().await;
        self.emit_source_list().await;
    }

    /// Send the current `ReceiverState` to the caller.
    pub(crate) async fn emit_receiver_state(&mut self) {
        let state = self.controller.state().await;

        let _ = self.send_out(ManagerOutputMessage::ReceiverState(state)).await;
    }

    /// Send the current `PollPhase` to the caller.
    pub(crate) async fn emit_poll_phase(&mut self) {
        let _ = self
            .send_out(ManagerOutputMessage::PollPhase(self.scheduler.phase()))
            .await;
    }

    /// Send the selectable source names to the caller.
    pub(crate) async fn emit_source_list(&mut self) {
        let _ = self
            .send_out(ManagerOutputMessage::SourceList(self.controller.source_list()))
            .await;
    }
}
