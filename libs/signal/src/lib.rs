//! References: https://stackoverflow.com/questions/77585473/rust-tokio-how-to-handle-more-signals-than-just-sigint-i-e-sigquit

use std::fmt;
use std::io;

/// The shutdown request that woke [`wait_for_stop_signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Terminate,
    Interrupt,
    CtrlC,
    CtrlBreak,
    CtrlClose,
    CtrlShutdown,
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopSignal::Terminate => "SIGTERM",
            StopSignal::Interrupt => "SIGINT",
            StopSignal::CtrlC => "CTRL_C",
            StopSignal::CtrlBreak => "CTRL_BREAK",
            StopSignal::CtrlClose => "CTRL_CLOSE",
            StopSignal::CtrlShutdown => "CTRL_SHUTDOWN",
        };
        f.write_str(name)
    }
}

#[cfg(unix)]
async fn wait_for_signal_impl() -> io::Result<StopSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    // Infos here:
    // https://www.gnu.org/software/libc/manual/html_node/Termination-Signals.html
    let mut signal_terminate = signal(SignalKind::terminate())?;
    let mut signal_interrupt = signal(SignalKind::interrupt())?;

    Ok(tokio::select! {
        _ = signal_terminate.recv() => StopSignal::Terminate,
        _ = signal_interrupt.recv() => StopSignal::Interrupt,
    })
}

#[cfg(windows)]
async fn wait_for_signal_impl() -> io::Result<StopSignal> {
    use tokio::signal::windows;

    // Infos here:
    // https://learn.microsoft.com/en-us/windows/console/handlerroutine
    let mut signal_c = windows::ctrl_c()?;
    let mut signal_break = windows::ctrl_break()?;
    let mut signal_close = windows::ctrl_close()?;
    let mut signal_shutdown = windows::ctrl_shutdown()?;

    Ok(tokio::select! {
        _ = signal_c.recv() => StopSignal::CtrlC,
        _ = signal_break.recv() => StopSignal::CtrlBreak,
        _ = signal_close.recv() => StopSignal::CtrlClose,
        _ = signal_shutdown.recv() => StopSignal::CtrlShutdown,
    })
}

/// Registers signal handlers and waits for a signal that
/// indicates a shutdown request.
///
/// Fails only when the handlers cannot be installed.
pub async fn wait_for_stop_signal() -> io::Result<StopSignal> {
    wait_for_signal_impl().await
}
