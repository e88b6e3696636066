use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use lexicon_av::ManagerMessage::{EmitAllState, PollNow, SendCommand, ShutDown};
use lexicon_av::ReceiverCommand::{
    SelectSource, SetMute, SetVolume, TurnOff, TurnOn, VolumeDown, VolumeUp,
};
use lexicon_av::{ConnectionSettings, LexiconManager, ManagerOutputMessage};

#[tokio::main]
async fn main() -> Result<(), ()> {
    // Receiver host is the first argument
    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "10.0.0.150".to_string());

    // Initialize manager and associated send/receive channels
    let (to_manager, to_manager_rx) = mpsc::channel(32);
    let (mut manager, mut from_manager) =
        LexiconManager::new(ConnectionSettings::new(&host), to_manager_rx);

    // Print all logs to stdout. Use RUST_LOG=debug to see per-operation connection detail.
    env_logger::Builder::new()
        .filter(None, log::LevelFilter::Info)
        .parse_default_env()
        .init();

    println!(concat!(
        ">>> Enter command:\n",
        ">>>    on, off, u (volume up), d (volume down), v <0.0-1.0> (set volume)\n",
        ">>>    m (mute), um (unmute), src <name> (select source)\n",
        ">>>    p (poll now), e (emit all state), s (shut down)\n"
    ));

    // Task to print all messages received from the manager
    tokio::spawn(async move {
        while let Some(manager_output_msg) = from_manager.recv().await {
            match manager_output_msg {
                ManagerOutputMessage::ReceiverState(state) => println!(
                    "<<< Receiver state: {}",
                    serde_json::to_string(&state).unwrap_or_default()
                ),
                other => println!("<<< Received message from LexiconManager: {:?}", other),
            }
        }
    });

    let to_manager_clone = to_manager.clone();

    // Task to accept commands from the console to send to the manager
    let stdin_handle = tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let mut reader = BufReader::new(stdin);

        loop {
            let mut buf = String::new();

            match reader.read_line(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }

            let message = match buf.trim().split_once(' ') {
                Some(("v", level)) => match level.trim().parse::<f32>() {
                    Ok(level) => SendCommand(SetVolume(level)),
                    Err(_) => {
                        println!(">>> Volume must be a number between 0.0 and 1.0");
                        continue;
                    }
                },
                Some(("src", name)) => SendCommand(SelectSource(name.trim().to_string())),
                _ => match buf.trim() {
                    "on" => SendCommand(TurnOn),
                    "off" => SendCommand(TurnOff),
                    "u" => SendCommand(VolumeUp),
                    "d" => SendCommand(VolumeDown),
                    "m" => SendCommand(SetMute(true)),
                    "um" => SendCommand(SetMute(false)),
                    "p" => PollNow,
                    "e" => EmitAllState,
                    "s" => {
                        to_manager_clone.send(ShutDown).await.map_err(|_| ())?;
                        break;
                    }
                    _ => continue,
                },
            };

            to_manager_clone.send(message).await.map_err(|_| ())?;
        }

        Ok(())
    });

    // Run the manager until instructed to shut down (ManagerMessage::ShutDown)
    manager.run().await;

    stdin_handle.await.map_err(|_| ())?
}
