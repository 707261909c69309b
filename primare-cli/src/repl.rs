//! Interactive command shell
//!
//! Reads one operation per line (`volume_set 40`, `mute_toggle`) until a
//! blank line, `q` or `quit`. `help` lists every operation and
//! `help <prefix>` lists the ones starting with the prefix.

use primare_control::AmplifierClient;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::CliError;
use crate::operations::{self, Value};

const PROMPT: &str = "Cmd: ";

/// What one input line asks for
#[derive(Debug, PartialEq, Eq)]
pub enum ReplAction {
    Quit,
    Help(Option<String>),
    Run { name: String, value: Option<Value> },
    Invalid(String),
}

pub fn parse_line(line: &str) -> ReplAction {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] | ["q"] | ["quit"] => ReplAction::Quit,
        ["help", prefix] => ReplAction::Help(Some(prefix.to_string())),
        ["help", ..] => ReplAction::Help(None),
        [name] => ReplAction::Run {
            name: name.to_string(),
            value: None,
        },
        [name, token] => match Value::parse(token) {
            Ok(value) => ReplAction::Run {
                name: name.to_string(),
                value: Some(value),
            },
            Err(e) => ReplAction::Invalid(e.to_string()),
        },
        [name, ..] => ReplAction::Invalid(format!("{name} takes at most one value")),
    }
}

fn help_for(prefix: Option<&str>) -> String {
    let Some(prefix) = prefix else {
        return operations::help_text();
    };
    let mut text = String::new();
    for operation in operations::matching(prefix) {
        text.push_str(&format!("{}:\n    {}\n", operation.name, operation.help));
    }
    if text.is_empty() {
        operations::help_text()
    } else {
        text
    }
}

/// Run the shell until the user quits or input ends
pub async fn run<R, W>(client: &AmplifierClient, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(help_for(None).as_bytes()).await?;
    let mut lines = input.lines();
    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let reply = match parse_line(&line) {
            ReplAction::Quit => break,
            ReplAction::Help(prefix) => help_for(prefix.as_deref()),
            ReplAction::Invalid(message) => {
                warn!("{}", message);
                format!("{message}\n")
            }
            ReplAction::Run { name, value } => {
                match operations::invoke(client, &name, value).await {
                    Ok(text) => format!("{text}\n"),
                    Err(CliError::UnknownOperation(name)) => {
                        format!("No such operation: {name} - try again\n")
                    }
                    Err(e) => {
                        warn!("{} failed: {}", name, e);
                        format!("{e}\n")
                    }
                }
            }
        };
        output.write_all(reply.as_bytes()).await?;
    }
    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use primare_control::{Amplifier, DeviceProfile};
    use primare_sim::{VirtualAmplifier, VirtualAmplifierConfig};
    use tokio::sync::{broadcast, mpsc};

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line(""), ReplAction::Quit);
        assert_eq!(parse_line("  q "), ReplAction::Quit);
        assert_eq!(parse_line("quit"), ReplAction::Quit);
        assert_eq!(parse_line("help"), ReplAction::Help(None));
        assert_eq!(parse_line("help vol"), ReplAction::Help(Some("vol".into())));
        assert_eq!(parse_line("help a b"), ReplAction::Help(None));
        assert_eq!(
            parse_line("mute_set TRUE"),
            ReplAction::Run {
                name: "mute_set".into(),
                value: Some(Value::Bool(true))
            }
        );
        assert_eq!(
            parse_line("volume_set 40"),
            ReplAction::Run {
                name: "volume_set".into(),
                value: Some(Value::Int(40))
            }
        );
        assert!(matches!(parse_line("volume_set 1 2"), ReplAction::Invalid(_)));
        assert!(matches!(parse_line("volume_set loud"), ReplAction::Invalid(_)));
    }

    #[test]
    fn test_help_prefix() {
        let text = help_for(Some("mute"));
        assert!(text.contains("mute_set:"));
        assert!(!text.contains("volume_set"));
        assert!(help_for(Some("zzz")).starts_with("Available operations"));
    }

    #[tokio::test]
    async fn test_session_against_virtual_amplifier() {
        let (client_io, amp_io) = tokio::io::duplex(256);
        let amp = VirtualAmplifier::new("I22", VirtualAmplifierConfig::default());
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, _) = broadcast::channel(8);
        let sim = tokio::spawn(primare_sim::run_virtual_amp_task(
            amp_io, amp, cmd_rx, state_tx,
        ));

        let profile = DeviceProfile {
            command_spacing_ms: 0,
            ..DeviceProfile::i22()
        };
        let amplifier = Amplifier::with_io(client_io, profile);

        let script = "volume_set 50\nmute_set false\nvolume_get\nbogus\nhelp dim\n\nvolume_up\n";
        let mut output = Vec::new();
        run(amplifier.client(), script.as_bytes(), &mut output)
            .await
            .unwrap();
        let text = String::from_utf8(output).unwrap();

        assert!(text.contains("Cmd: ok\nCmd: ok\nCmd: 51\n"), "{text}");
        assert!(text.contains("No such operation: bogus"));
        assert!(text.contains("dim_set:"));
        // Blank line ends the session before volume_up runs
        assert_eq!(amplifier.state().volume, Some(40));

        amplifier.close().await;
        let _ = sim.await;
    }
}
