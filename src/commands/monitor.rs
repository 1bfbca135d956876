//! `aqmon monitor`: run the acquisition loop in the foreground.

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use aqmon_lib::{
    link::SerialConnector, AcquisitionController, AcquisitionStatus, Database, Settings,
};
use log::info;

use super::print_reading;

pub fn apply_device_flags(
    settings: &mut Settings,
    device: Option<PathBuf>,
    describe: Option<String>,
    query_mode: bool,
) {
    if let Some(path) = device {
        settings.device.path = Some(path);
    }
    if let Some(description) = describe {
        settings.device.path = None;
        settings.device.description = description;
    }
    if query_mode {
        settings.device.query_mode = true;
    }
}

pub async fn execute(settings: Settings, json: bool) -> Result<()> {
    let db = Database::new(settings.database_path.clone(), settings.store_options())?;

    let connector = SerialConnector::new(settings.device_selector())
        .with_baud_rate(settings.device.baud_rate)
        .with_query_mode(settings.device.query_mode);

    let mut controller = AcquisitionController::new(settings.acquisition_config());
    let mut readings = controller.subscribe();
    let mut status = controller.status();

    controller.start(Arc::new(connector), db.clone())?;

    loop {
        tokio::select! {
            reading = readings.recv() => match reading {
                Some(reading) => print_reading(&reading, json)?,
                None => break,
            },
            changed = status.changed() => {
                if changed.is_err() || *status.borrow_and_update() == AcquisitionStatus::Stopped {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    controller.stop().await?;
    db.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqmon_lib::DeviceSelector;

    #[test]
    fn describe_flag_replaces_configured_path() {
        let mut settings = Settings::default();
        settings.device.path = Some("/dev/ttyUSB0".into());
        apply_device_flags(&mut settings, None, Some("CH340".into()), true);

        assert_eq!(
            settings.device_selector(),
            DeviceSelector::Description("CH340".into())
        );
        assert!(settings.device.query_mode);
    }

    #[test]
    fn device_flag_sets_path() {
        let mut settings = Settings::default();
        apply_device_flags(&mut settings, Some("/dev/ttyS4".into()), None, false);
        assert_eq!(
            settings.device_selector(),
            DeviceSelector::Path("/dev/ttyS4".into())
        );
        assert!(!settings.device.query_mode);
    }
}
