//! `seance join`: a terminal participant.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};

use seance_client::{
    AnimationSynchronizer, ConnectionState, ReconnectPolicy, ReconnectionController, RevealEvent,
    RevealSequence, WsConnector,
};
use seance_core::envelope::{ErrorPayload, MessageReceivedPayload, SpiritResponsePayload};
use seance_core::{Envelope, EventKind, Handshake, Identity, UserId};
use seance_settings::SeanceSettings;

use crate::JoinArgs;

/// Typed by the participant to leave.
const LEAVE_COMMAND: &str = "/leave";

/// What the terminal does with one inbound envelope.
#[derive(Debug, PartialEq)]
enum Rendered {
    Line(String),
    Reveal(RevealSequence),
    Nothing,
}

fn render(envelope: &Envelope) -> Rendered {
    match envelope.kind() {
        EventKind::UserJoined => match envelope.payload_as::<Identity>() {
            Ok(who) => Rendered::Line(format!("* {} joined", who.name)),
            Err(_) => Rendered::Nothing,
        },
        EventKind::UserLeft => match envelope.payload_as::<Identity>() {
            Ok(who) => Rendered::Line(format!("* {} left", who.name)),
            Err(_) => Rendered::Nothing,
        },
        EventKind::MessageReceived => match envelope.payload_as::<MessageReceivedPayload>() {
            Ok(msg) => Rendered::Line(format!("{}: {}", msg.user_name, msg.message)),
            Err(_) => Rendered::Nothing,
        },
        EventKind::SpiritThinking => Rendered::Line("~ the spirit stirs...".into()),
        EventKind::SpiritResponse => match envelope.payload_as::<SpiritResponsePayload>() {
            Ok(response) => match RevealSequence::from_payload(&response) {
                Ok(sequence) => Rendered::Reveal(sequence),
                Err(e) => {
                    tracing::warn!(error = %e, "response timings unusable, printing at once");
                    Rendered::Line(format!("~ {}", response.message))
                }
            },
            Err(_) => Rendered::Nothing,
        },
        EventKind::Error => match envelope.payload_as::<ErrorPayload>() {
            Ok(err) => Rendered::Line(format!("! {}", err.message)),
            Err(_) => Rendered::Nothing,
        },
        EventKind::SendMessage | EventKind::Other(_) => Rendered::Nothing,
    }
}

fn describe_state(state: &ConnectionState) -> Option<String> {
    match state {
        ConnectionState::Open => Some("* connected".into()),
        ConnectionState::ReconnectWait { attempt, delay_ms } => Some(format!(
            "* connection lost, retrying in {}.{}s (attempt {attempt})",
            delay_ms / 1000,
            delay_ms % 1000 / 100
        )),
        ConnectionState::Closed => Some("* left the session".into()),
        ConnectionState::Failed { attempts } => {
            Some(format!("* could not reconnect after {attempts} attempts"))
        }
        ConnectionState::Rejected { reason } => Some(format!("* refused by the server: {reason}")),
        ConnectionState::Idle | ConnectionState::Connecting { .. } => None,
    }
}

fn print_line(line: &str) {
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

fn print_reveal(event: &RevealEvent) {
    let mut out = std::io::stdout().lock();
    match event {
        RevealEvent::Reveal { index: 0, ch, .. } => {
            let _ = write!(out, "~ {ch}");
        }
        RevealEvent::Reveal { ch, .. } => {
            let _ = write!(out, "{ch}");
        }
        RevealEvent::Done { .. } => {
            let _ = writeln!(out);
        }
    }
    let _ = out.flush();
}

/// Handshake for a fresh participant. A given name must not be blank, since
/// the server refuses it.
fn handshake_for(name: Option<&str>) -> Result<Handshake> {
    if name.is_some_and(|n| n.trim().is_empty()) {
        bail!("--name must not be blank");
    }
    Ok(Handshake {
        user_id: Some(UserId::new().into_inner()),
        name: name.map(str::to_owned),
    })
}

/// Join `args.session` and relay stdin lines as questions until the
/// participant leaves or reconnection gives up.
pub(crate) async fn run(settings: &SeanceSettings, args: JoinArgs) -> Result<()> {
    let url = args
        .url
        .unwrap_or_else(|| settings.client.server_url.clone());
    let handshake = handshake_for(args.name.as_deref())?;
    let display_name = args.name.unwrap_or_else(|| "Anonymous".into());
    let connector = Arc::new(WsConnector::new(&url, &args.session, handshake));
    tracing::info!(url = connector.url(), "joining");

    let (controller, mut inbound) =
        ReconnectionController::start(connector, ReconnectPolicy::from_settings(&settings.client));
    let (reveal, mut reveals) = AnimationSynchronizer::new();
    let mut states = controller.watch();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    print_line(&format!(
        "Joining '{}' as {display_name}. Type a question, or {LEAVE_COMMAND} to go.",
        args.session
    ));

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if let Some(line) = describe_state(&state) {
                    if reveal.is_running() {
                        reveal.cancel();
                        print_line("");
                    }
                    print_line(&line);
                }
                if state.is_terminal() {
                    break;
                }
            }
            Some(envelope) = inbound.recv() => match render(&envelope) {
                Rendered::Line(line) => print_line(&line),
                Rendered::Reveal(sequence) => {
                    let _ = reveal.start(sequence);
                }
                Rendered::Nothing => {}
            },
            Some(event) = reveals.recv() => print_reveal(&event),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim() == LEAVE_COMMAND => controller.leave(),
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    let question = Envelope::send_message(&display_name, &line);
                    if let Err(e) = controller.send(&question) {
                        print_line(&format!("! not sent: {e}"));
                    }
                }
                Ok(None) | Err(_) => {
                    stdin_open = false;
                    controller.leave();
                }
            },
            _ = tokio::signal::ctrl_c() => controller.leave(),
        }
    }

    match controller.wait_terminal().await {
        ConnectionState::Failed { attempts } => {
            bail!("gave up after {attempts} reconnection attempts")
        }
        ConnectionState::Rejected { reason } => bail!("server refused to join: {reason}"),
        _ => Ok(()),
    }
}
