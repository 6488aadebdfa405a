use std::path::Path;

use depthcam::UsbDeviceDirectory;
use fleet::{
    FirmwareImage, OutputSink, UpdateConfig, UpdateOrchestrator,
    latest_firmware,
};

use crate::CliError;

pub(crate) fn update_fleet(fw_dir: &Path, jobs: usize) -> Result<(), CliError> {
    let path = latest_firmware(fw_dir)
        .ok_or_else(|| CliError::NoFirmware(fw_dir.to_owned()))?;
    let sink = OutputSink::stdout();
    sink.line(path.display().to_string());
    let image = FirmwareImage::load(&path)?;

    let config = UpdateConfig {
        max_concurrent: jobs,
        ..UpdateConfig::default()
    };
    let orchestrator =
        UpdateOrchestrator::with_config(UsbDeviceDirectory::new(), config, sink);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()?;
    let report = runtime.block_on(orchestrator.run(&image))?;

    println!(
        "{} updated, {} skipped, {} failed",
        report.updated(),
        report.skipped(),
        report.failed()
    );
    Ok(())
}
