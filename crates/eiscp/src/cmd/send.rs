use std::time::Duration;

use eiscp_frame::Message;
use eiscp_session::{SessionError, Subscriber};
use tracing::debug;

use crate::cmd::{device_name, open_session, parse_duration, SendArgs};
use crate::exit::{frame_error, session_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let message =
        Message::parse(&args.message).map_err(|err| frame_error("invalid message", err))?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;

    let session = open_session(&args.address).await?;
    let mut subscriber = session
        .attach()
        .map_err(|err| session_error("attach failed", err))?;

    subscriber
        .send(message.clone())
        .await
        .map_err(|err| session_error("send failed", err))?;

    if args.wait {
        let reply = wait_for_reply(&mut subscriber, message.command(), wait_timeout).await?;
        print_message(&reply, &device_name(&session, &args.address), format);
    }

    subscriber.close();
    session.shutdown();
    session.closed().await;
    Ok(SUCCESS)
}

trait MessageSource {
    async fn next_message(&mut self) -> Result<Message, SessionError>;
}

impl MessageSource for Subscriber {
    async fn next_message(&mut self) -> Result<Message, SessionError> {
        self.receive().await
    }
}

async fn next_with_command<S: MessageSource>(
    source: &mut S,
    command: &str,
) -> Result<Message, SessionError> {
    loop {
        let message = source.next_message().await?;
        if message.command() == command {
            return Ok(message);
        }
        debug!(%message, "ignoring unrelated message");
    }
}

/// First message from the device carrying `command`, within `timeout`.
async fn wait_for_reply<S: MessageSource>(
    source: &mut S,
    command: &str,
    timeout: Duration,
) -> CliResult<Message> {
    tokio::time::timeout(timeout, next_with_command(source, command))
        .await
        .map_err(|_| {
            CliError::new(
                TIMEOUT,
                format!("no {command} reply within {}ms", timeout.as_millis()),
            )
        })?
        .map_err(|err| session_error("receive failed", err))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::exit::FAILURE;

    struct Scripted(VecDeque<&'static str>);

    impl MessageSource for Scripted {
        async fn next_message(&mut self) -> Result<Message, SessionError> {
            match self.0.pop_front() {
                Some(raw) => Ok(Message::parse(raw).unwrap()),
                None => Err(SessionError::HandleClosed),
            }
        }
    }

    struct Silent;

    impl MessageSource for Silent {
        async fn next_message(&mut self) -> Result<Message, SessionError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn wait_skips_other_commands() {
        let mut source = Scripted(VecDeque::from(["MVL20", "SLI23", "PWR01"]));
        let reply = wait_for_reply(&mut source, "PWR", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply.to_string(), "PWR01");
    }

    #[tokio::test]
    async fn wait_reports_closed_session() {
        let mut source = Scripted(VecDeque::from(["MVL20"]));
        let err = wait_for_reply(&mut source, "PWR", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.code, FAILURE);
    }

    #[tokio::test]
    async fn wait_times_out() {
        let err = wait_for_reply(&mut Silent, "PWR", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.code, TIMEOUT);
    }
}
