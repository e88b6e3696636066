/*!
Asynchronous control manager for Lexicon AV receivers.

Lexicon receivers (RV-6, RV-9, MC-10 and relatives) expose their RS232 control protocol over a
raw TCP socket on port 50000. [`LexiconManager`] keeps an eye on a receiver and sends it commands
over that socket.

## Features

* Power on/off with boot tracking: the receiver is only reported as ready once it has stayed on
  and answered data queries after its boot window.
* Volume (stepped and absolute), mute, and source selection.
* Periodic status polling of power, volume, mute, source, direct mode, decode mode, audio format,
  and sample rate.
* Custom display names for the receiver's physical inputs.
* Single-connection discipline: the receiver only serves one TCP client at a time, so every poll
  and command is a short connect, exchange, disconnect operation, and the vendor's own app can
  still get in between them.

## Overview

A `LexiconManager` instance:

1. Polls the receiver on a schedule that adapts to its power state (quick polls at startup, every
   30 seconds while on, every 60 seconds while off or unreachable).
2. Accepts [`ManagerMessage`] messages from the caller to:
    * Send [`ReceiverCommand`] messages (e.g. increase volume) to the receiver.
    * Poll immediately.
    * Re-emit all state.
    * Shut down.
3. Sends [`ManagerOutputMessage`] updates back to the caller:
    * The [`ReceiverState`] (power, readiness, volume, source, audio details) whenever it changes.
    * The current [`PollPhase`].
    * The selectable source list.
    * The result of each command, and any errors.

To view the full documentation, clone the repository and run `cargo doc --open`.

Run the example with:

```sh
cargo run --example control -- 10.0.0.150
```

## Asynchronous

Communication with `LexiconManager` is asynchronous. Commands are invoked on the receiver by
sending a [`ManagerMessage`] to the manager. Each [`ManagerMessage::SendCommand`] is answered with
a [`ManagerOutputMessage::CommandResult`]. Any changes to the receiver's state are passed back to
the caller via [`ManagerOutputMessage::ReceiverState`], which contains the entire known state of
the receiver at the time the message was sent.

Callers that would rather `await` each command can use the [`LexiconController`] directly, either
standalone or via [`LexiconManager::controller()`]. The controller is cheap to clone and every
clone shares the same connection gate and state.

## Instantiating

Instantiate a `LexiconManager` with [`LexiconManager::new()`], providing the receiver's
[`ConnectionSettings`] and a channel that will be used to send [`ManagerMessage`] messages to the
manager. `LexiconManager::new()` will return a tuple of the manager instance itself, and another
channel over which the manager will send [`ManagerOutputMessage`] messages back to the caller.

```
use lexicon_av::{ConnectionSettings, LexiconManager};
use tokio::sync::mpsc;

let (to_manager, to_manager_rx) = mpsc::channel(32);
let (mut manager, mut from_manager) =
    LexiconManager::new(ConnectionSettings::new("10.0.0.150"), to_manager_rx);

// Send messages with to_manager.send()
// Receive messages with from_manager.recv()
```

Poll settings and input names can be configured using the [`LexiconManagerBuilder`]. Connection
timeouts can be configured using the [`ConnectionSettingsBuilder`].

## Power and readiness

The receiver only has a power *toggle*, so the manager keeps track of the power state itself.
`TurnOn` is only sent when the receiver is not already known to be on, and `TurnOff` only when it
is not already known to be off.

After a power-on the receiver spends several seconds booting. During that window it drops
connections and answers queries erratically, so the manager assumes it is on without asking, and
[`ReceiverState::is_ready`] stays `false`. A verification poll runs once the boot window has
closed and settled; the receiver is ready only if that poll sees it on and at least one data query
succeeds.

## Unreachable receivers

If the receiver can't be reached (it is off at the wall, or another client holds its single TCP
connection) a poll gives up after the first failed query. Previously known values are kept, and
[`ReceiverState::staleness`] reports how long ago the last successful poll was.

## Limitations

Only the main zone is controlled. The crate does not discover receivers on the network, and only
supports the [`ReceiverCommand`] list found in `src/commands.rs`.
*/

mod boot_sequencer;
mod codes;
mod commands;
mod connection_settings;
mod controller;
mod error;
mod gate;
mod helpers;
mod input_mapping;
mod lexicon_manager;
mod lexicon_manager_builder;
mod poll_scheduler;
mod poll_settings;
mod protocol;
mod queries;
mod state;

#[cfg(test)]
mod test_support;

pub use boot_sequencer::{BootState, BootWindow};
pub use codes::{Input, Source};
pub use commands::ReceiverCommand;
pub use connection_settings::{ConnectionSettings, ConnectionSettingsBuilder, DEFAULT_PORT};
pub use controller::{ControllerEvent, LexiconController, PollOutcome};
pub use error::CommandFailure;
pub use input_mapping::InputMapping;
pub use lexicon_manager::{LexiconManager, ManagerError, ManagerMessage, ManagerOutputMessage};
pub use lexicon_manager_builder::LexiconManagerBuilder;
pub use poll_scheduler::{PollKind, PollPhase, PowerObservation};
pub use poll_settings::PollSettings;
pub use protocol::{
    encode_command, encode_query, encode_rc5, encode_response, read_frame, CommandCode, Frame,
    FrameError, FrameKind, Rc5Command,
};
pub use state::{PowerState, ReceiverState};
