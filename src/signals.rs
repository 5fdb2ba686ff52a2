use std::future::Future;

use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tokio::sync::oneshot;

/// Resolves on the first SIGINT or SIGTERM. A second signal exits the
/// process immediately.
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let (tx, rx) = oneshot::channel();

    std::thread::spawn(move || {
        let mut tx = Some(tx);
        for signal in signals.forever() {
            match tx.take() {
                Some(tx) => {
                    log::info!("Received signal {signal}, shutting down");
                    notify_stopping();
                    let _ = tx.send(());
                }
                None => {
                    log::warn!("Received signal {signal} again, exiting now");
                    std::process::exit(1);
                }
            }
        }
    });

    Ok(async move {
        let _ = rx.await;
    })
}

/// Tell systemd we are ready. No-op outside of systemd.
pub fn notify_ready() {
    let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]);
}

pub fn notify_stopping() {
    let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Stopping]);
}
