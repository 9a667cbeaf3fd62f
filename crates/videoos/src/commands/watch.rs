//! `watch`: stay logged in and stream every event until Ctrl-C.

use std::time::Duration;

use tracing::{info, warn};
use videoos_core::{Device, KeyFilter};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

const SESSION_CHECK: Duration = Duration::from_secs(1);

pub async fn handle(device: &Device, global: &GlobalOpts) -> Result<(), CliError> {
    let format = global.output;
    let subscription = device.subscribe(KeyFilter::All, move |event| {
        match output::event_line(format, event) {
            Ok(line) => output::print_output(&line),
            Err(e) => warn!(error = %e, "failed to render event"),
        }
    });

    if let Err(e) = device.connect().await {
        device.unsubscribe(subscription);
        return Err(e.into());
    }
    info!("watching; press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut check = tokio::time::interval(SESSION_CHECK);
    let outcome = loop {
        tokio::select! {
            signal = &mut ctrl_c => break signal.map_err(CliError::from),
            _ = check.tick() => {
                if !device.is_connected() {
                    break Err(CliError::SessionExpired);
                }
            }
        }
    };

    device.unsubscribe(subscription);
    device.disconnect().await?;
    outcome
}
