//! Command dispatch: bridges CLI args -> device operations -> output.

pub mod config_cmd;
pub mod device;
pub mod watch;

use videoos_core::Device;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a device-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, device: &Device, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Status => device::status(device, global).await,
        Command::Reboot => device::reboot(device).await,
        Command::DeviceMode(args) => device::device_mode(device, args, global).await,
        Command::Watch => watch::handle(device, global).await,
        // Config is handled before a device is built
        Command::Config(_) => unreachable!(),
    }
}
