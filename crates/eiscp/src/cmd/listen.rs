use eiscp_frame::Message;
use eiscp_session::{CloseReason, Session, SessionError, SessionState};
use tracing::{info, warn};

use crate::cmd::{device_name, open_session, ListenArgs};
use crate::exit::{session_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let session = open_session(&args.address).await?;
    let mut subscriber = session
        .attach()
        .map_err(|err| session_error("attach failed", err))?;
    let device = device_name(&session, &args.address);

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let mut printed = 0usize;
    let outcome = loop {
        let message = tokio::select! {
            result = subscriber.receive() => match result {
                Ok(message) => message,
                Err(SessionError::HandleClosed) => break ended(&session).await,
                Err(err) => break Err(session_error("receive failed", err)),
            },
            _ = &mut interrupt => {
                info!("interrupted");
                break Ok(SUCCESS);
            }
        };

        if !wanted(args.commands.as_deref(), &message) {
            continue;
        }

        print_message(&message, &device, format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break Ok(SUCCESS);
        }
    };

    subscriber.close();
    session.shutdown();
    outcome
}

fn wanted(commands: Option<&[String]>, message: &Message) -> bool {
    commands.is_none_or(|commands| {
        commands
            .iter()
            .any(|command| command.eq_ignore_ascii_case(message.command()))
    })
}

/// Exit status once the subscriber's queue has closed.
async fn ended(session: &Session) -> CliResult<i32> {
    if session.state() == SessionState::Open {
        warn!("listener fell behind the device");
        return Err(CliError::new(FAILURE, "listener dropped for falling behind"));
    }
    exit_for(session.closed().await)
}

fn exit_for(reason: CloseReason) -> CliResult<i32> {
    match reason {
        CloseReason::Shutdown => Ok(SUCCESS),
        reason => Err(CliError::new(
            FAILURE,
            format!("device session ended: {reason}"),
        )),
    }
}
