//! One-shot device commands: log in, act, log out.

use tracing::debug;
use videoos_core::Device;

use crate::cli::{DeviceModeArgs, DeviceModeCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub async fn status(device: &Device, global: &GlobalOpts) -> Result<(), CliError> {
    device.connect().await?;
    let state = device.print_debug_state();
    logout(device).await;

    let rendered = output::render_single(global.output, &state, ToString::to_string)?;
    output::print_output(&rendered);
    Ok(())
}

pub async fn reboot(device: &Device) -> Result<(), CliError> {
    device.connect().await?;
    device.reboot().await?;
    // The unit is going down; the logout may not be answered.
    logout(device).await;
    output::print_output("reboot requested");
    Ok(())
}

pub async fn device_mode(
    device: &Device,
    args: DeviceModeArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    device.connect().await?;
    let result = match args.command {
        DeviceModeCommand::Start => device.start_device_mode().await,
        DeviceModeCommand::Stop => device.stop_device_mode().await,
    };
    let mode = device.system_mode();
    logout(device).await;
    result?;

    if let Some(mode) = mode {
        let rendered = output::render_single(global.output, &mode, output::mode_detail)?;
        output::print_output(&rendered);
    }
    Ok(())
}

async fn logout(device: &Device) {
    if let Err(e) = device.disconnect().await {
        debug!(error = %e, "logout failed");
    }
}
