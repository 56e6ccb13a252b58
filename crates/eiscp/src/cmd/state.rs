use std::collections::BTreeSet;

use eiscp_frame::Message;
use eiscp_session::{SessionError, Subscriber};
use tracing::warn;

use crate::cmd::{device_name, open_session, parse_duration, StateArgs};
use crate::exit::{frame_error, session_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_state, OutputFormat};

pub async fn run(args: StateArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let queries = build_queries(&args.query)?;

    let session = open_session(&args.address).await?;
    let mut subscriber = session
        .attach()
        .map_err(|err| session_error("attach failed", err))?;

    for query in &queries {
        subscriber
            .send(query.clone())
            .await
            .map_err(|err| session_error("query failed", err))?;
    }

    let mut pending: BTreeSet<String> = queries
        .iter()
        .map(|query| query.command().to_string())
        .collect();
    let waited = tokio::time::timeout(timeout, await_replies(&mut subscriber, &mut pending)).await;
    match waited {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(session_error("receive failed", err)),
        Err(_) => warn!(missing = ?pending, "device did not answer every query"),
    }

    let missing: Vec<String> = pending.into_iter().collect();
    print_state(
        &session.snapshot(),
        &missing,
        &device_name(&session, &args.address),
        format,
    );

    subscriber.close();
    session.shutdown();
    session.closed().await;

    if missing.is_empty() {
        Ok(SUCCESS)
    } else {
        Err(CliError::new(
            TIMEOUT,
            format!("no reply for {}", missing.join(",")),
        ))
    }
}

fn build_queries(commands: &[String]) -> CliResult<Vec<Message>> {
    let mut seen = BTreeSet::new();
    let mut queries = Vec::with_capacity(commands.len());
    for command in commands {
        let command = command.trim().to_ascii_uppercase();
        if !seen.insert(command.clone()) {
            continue;
        }
        queries.push(Message::query(command).map_err(|err| frame_error("invalid query", err))?);
    }
    Ok(queries)
}

async fn await_replies(
    subscriber: &mut Subscriber,
    pending: &mut BTreeSet<String>,
) -> Result<(), SessionError> {
    while !pending.is_empty() {
        let message = subscriber.receive().await?;
        pending.remove(message.command());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::USAGE;

    #[test]
    fn queries_are_normalized_and_deduplicated() {
        let commands = vec!["pwr".to_string(), " MVL".to_string(), "PWR".to_string()];
        let queries = build_queries(&commands).unwrap();
        let raw: Vec<String> = queries.iter().map(Message::to_string).collect();
        assert_eq!(raw, ["PWRQSTN", "MVLQSTN"]);
    }

    #[test]
    fn bad_command_is_usage_error() {
        let err = build_queries(&["POWER".to_string()]).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
