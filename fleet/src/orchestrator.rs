use std::{sync::Arc, time::Duration};

use tokio::{
    sync::Semaphore,
    task::JoinSet,
    time::{Instant, sleep},
};

use crate::{
    directory::{DeviceAttribute, DeviceDirectory, SdkError},
    error::UpdateError,
    firmware::FirmwareImage,
    identity::IdentityMap,
    sink::OutputSink,
};

/// Knobs of an update run. The defaults are the production values; tests
/// dial the waits down to milliseconds.
#[derive(Clone, Debug)]
pub struct UpdateConfig {
    /// Upper bound on simultaneously running flash operations.
    pub max_concurrent: usize,
    /// Interval between enumeration polls.
    pub poll_interval: Duration,
    /// How long to wait for the fleet to report update mode. Expiry is not
    /// fatal; devices that never made it are skipped during flashing.
    pub convergence_timeout: Duration,
    /// How many re-enumeration attempts the flashing phase makes before
    /// giving up on an incomplete fleet.
    pub relist_attempts: u32,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        UpdateConfig {
            max_concurrent: crate::DEFAULT_MAX_CONCURRENT,
            poll_interval: crate::DEFAULT_POLL_INTERVAL,
            convergence_timeout: crate::DEFAULT_CONVERGENCE_TIMEOUT,
            relist_attempts: crate::DEFAULT_RELIST_ATTEMPTS,
        }
    }
}

/// Per-device result of the flashing phase.
#[derive(Debug)]
pub enum FlashOutcome {
    /// The image was pushed successfully.
    Updated,
    /// The device was not in update mode when its task ran.
    Skipped,
    /// The flash (or an attribute read inside the task) failed.
    Failed(SdkError),
}

/// One device's outcome, labeled for humans.
#[derive(Debug)]
pub struct DeviceReport {
    pub label: String,
    pub outcome: FlashOutcome,
}

/// Collected outcomes of a completed run.
#[derive(Debug, Default)]
pub struct FleetReport {
    pub devices: Vec<DeviceReport>,
}

impl FleetReport {
    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, FlashOutcome::Updated))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FlashOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FlashOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&FlashOutcome) -> bool) -> usize {
        self.devices.iter().filter(|d| pred(&d.outcome)).count()
    }
}

/// Drives a whole fleet through a firmware update.
///
/// The run is a fixed phase sequence: discovery, update-mode entry, a
/// polled convergence wait, then a concurrent flashing phase gated by a
/// semaphore. Only fleet-level preconditions abort the run; a single
/// device's flash failure is recorded and never cascades to its siblings.
pub struct UpdateOrchestrator<D: DeviceDirectory> {
    directory: Arc<D>,
    config: UpdateConfig,
    sink: OutputSink,
}

impl<D: DeviceDirectory> UpdateOrchestrator<D> {
    pub fn new(directory: D, sink: OutputSink) -> Self {
        UpdateOrchestrator::with_config(
            directory,
            UpdateConfig::default(),
            sink,
        )
    }

    pub fn with_config(
        directory: D,
        config: UpdateConfig,
        sink: OutputSink,
    ) -> Self {
        UpdateOrchestrator {
            directory: Arc::new(directory),
            config,
            sink,
        }
    }

    pub async fn run(
        &self,
        image: &FirmwareImage,
    ) -> Result<FleetReport, UpdateError> {
        let (devices, identities) = self.discover()?;
        let expected = devices.len();
        self.enter_update_mode(&devices)?;
        // Handles from before the transition are dead once the fleet
        // reboots; flashing works on a fresh snapshot.
        drop(devices);
        self.await_convergence(expected).await;
        self.flash_fleet(expected, identities, image).await
    }

    /// Snapshot the fleet and capture the update-mode id → serial mapping
    /// while both attributes are still readable.
    fn discover(&self) -> Result<(Vec<D::Handle>, IdentityMap), UpdateError> {
        let devices = self.directory.list_devices()?;
        if devices.is_empty() {
            return Err(UpdateError::NoDevices);
        }
        self.sink.line(format!("Found {} devices", devices.len()));

        let mut identities = IdentityMap::new();
        for device in &devices {
            let serial = self
                .directory
                .attribute(device, DeviceAttribute::SerialNumber)?;
            let update_id =
                self.directory.attribute(device, DeviceAttribute::UpdateId)?;
            // Devices missing either attribute still count toward the
            // fleet size; they just flash under their raw id later.
            if let (Some(serial), Some(update_id)) = (serial, update_id) {
                identities.record(update_id, serial);
            }
        }
        Ok((devices, identities))
    }

    fn enter_update_mode(
        &self,
        devices: &[D::Handle],
    ) -> Result<(), UpdateError> {
        let mut commanded = 0;
        for (index, device) in devices.iter().enumerate() {
            if self.directory.in_update_mode(device)
                || !self.directory.update_capable(device)
            {
                continue;
            }
            self.directory.enter_update_mode(device).map_err(|source| {
                UpdateError::EnterUpdateMode { index, source }
            })?;
            commanded += 1;
        }
        self.sink
            .line(format!("Requested update mode for {commanded} devices"));
        Ok(())
    }

    /// Poll until the whole fleet reports update mode or the timeout
    /// expires. Expiry is tolerated: devices that cannot enter update mode
    /// are skipped by their flashing task.
    async fn await_convergence(&self, expected: usize) {
        let deadline = Instant::now() + self.config.convergence_timeout;
        loop {
            match self.count_in_update_mode() {
                Ok(seen) if seen >= expected => {
                    self.sink.line(format!(
                        "{seen} of {expected} devices in update mode"
                    ));
                    return;
                }
                Ok(seen) => {
                    log::debug!(
                        "{seen} of {expected} devices in update mode"
                    );
                }
                Err(err) => {
                    log::debug!(
                        "enumeration failed while waiting for update mode: {err}"
                    );
                }
            }
            if Instant::now() >= deadline {
                self.sink.line("Update-mode wait timed out, continuing");
                return;
            }
            sleep(self.config.poll_interval).await;
        }
    }

    fn count_in_update_mode(&self) -> Result<usize, SdkError> {
        Ok(self
            .directory
            .list_devices()?
            .iter()
            .filter(|device| self.directory.in_update_mode(device))
            .count())
    }

    /// Re-enumerate until the fleet is whole again, then flash every device
    /// in the fresh snapshot concurrently, bounded by the gate.
    async fn flash_fleet(
        &self,
        expected: usize,
        identities: IdentityMap,
        image: &FirmwareImage,
    ) -> Result<FleetReport, UpdateError> {
        let devices = self.relist(expected).await?;
        self.sink.line(format!("Flashing {} devices", devices.len()));

        let identities = Arc::new(identities);
        let gate = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut tasks: JoinSet<DeviceReport> = JoinSet::new();
        for device in devices {
            let directory = Arc::clone(&self.directory);
            let identities = Arc::clone(&identities);
            let image = image.clone();
            let gate = Arc::clone(&gate);
            let sink = self.sink.clone();
            tasks.spawn(async move {
                // The permit is held until the blocking flash returns, so
                // at most `max_concurrent` flashes run at any moment.
                let _permit =
                    gate.acquire_owned().await.expect("gate is never closed");
                let worker = tokio::task::spawn_blocking(move || {
                    flash_device(
                        directory.as_ref(),
                        &device,
                        &identities,
                        &image,
                        &sink,
                    )
                });
                match worker.await {
                    Ok(report) => report,
                    Err(err) => failed_task_report(err),
                }
            });
        }

        let mut report = FleetReport::default();
        while let Some(joined) = tasks.join_next().await {
            report.devices.push(match joined {
                Ok(device_report) => device_report,
                Err(err) => failed_task_report(err),
            });
        }
        self.sink.line("Updating devices Complete");
        Ok(report)
    }

    async fn relist(
        &self,
        expected: usize,
    ) -> Result<Vec<D::Handle>, UpdateError> {
        let mut seen = 0;
        for attempt in 0..self.config.relist_attempts {
            if attempt > 0 {
                sleep(self.config.poll_interval).await;
            }
            match self.directory.list_devices() {
                Ok(devices) if devices.len() >= expected => {
                    return Ok(devices);
                }
                Ok(devices) => {
                    seen = devices.len();
                    log::debug!(
                        "re-enumeration saw {seen} of {expected} devices"
                    );
                }
                Err(err) => log::debug!("re-enumeration failed: {err}"),
            }
        }
        Err(UpdateError::ConvergenceStalled { seen, expected })
    }
}

/// A flashing task that died (panicked) still yields a report; siblings
/// keep running.
fn failed_task_report(err: tokio::task::JoinError) -> DeviceReport {
    DeviceReport {
        label: String::from("unidentified device"),
        outcome: FlashOutcome::Failed(SdkError::new("flash_task", "", err)),
    }
}

/// Flash a single device from the post-convergence snapshot. Every failure
/// is converted into an outcome here; nothing escapes the task boundary.
fn flash_device<D: DeviceDirectory>(
    directory: &D,
    device: &D::Handle,
    identities: &IdentityMap,
    image: &FirmwareImage,
    sink: &OutputSink,
) -> DeviceReport {
    let update_id =
        match directory.attribute(device, DeviceAttribute::UpdateId) {
            Ok(id) => id,
            Err(err) => {
                sink.line(format!("unidentified device: update failed: {err}"));
                return DeviceReport {
                    label: String::from("unidentified device"),
                    outcome: FlashOutcome::Failed(err),
                };
            }
        };
    let label = match &update_id {
        Some(id) => identities.label(id).to_string(),
        None => String::from("unidentified device"),
    };

    if !directory.in_update_mode(device) {
        sink.line(format!("{label}: not in update mode, skipping"));
        return DeviceReport {
            label,
            outcome: FlashOutcome::Skipped,
        };
    }

    sink.line(format!("{label}: updating"));
    match directory.flash(device, image.data()) {
        Ok(()) => {
            sink.line(format!("{label}: updated"));
            DeviceReport {
                label,
                outcome: FlashOutcome::Updated,
            }
        }
        Err(err) => {
            sink.line(format!("{label}: update failed: {err}"));
            DeviceReport {
                label,
                outcome: FlashOutcome::Failed(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::{HashSet, VecDeque},
        fs, io,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    #[derive(Clone)]
    struct MockDevice {
        serial: Option<&'static str>,
        update_id: Option<&'static str>,
        capable: bool,
        in_update_mode: bool,
    }

    fn normal(serial: &'static str, update_id: &'static str) -> MockDevice {
        MockDevice {
            serial: Some(serial),
            update_id: Some(update_id),
            capable: true,
            in_update_mode: false,
        }
    }

    fn recovery(update_id: &'static str) -> MockDevice {
        MockDevice {
            serial: None,
            update_id: Some(update_id),
            capable: true,
            in_update_mode: true,
        }
    }

    type Snapshot = Result<Vec<MockDevice>, &'static str>;

    struct MockState {
        snapshots: Mutex<VecDeque<Snapshot>>,
        enter_commands: Mutex<Vec<String>>,
        fail_enter: HashSet<&'static str>,
        fail_flash: HashSet<&'static str>,
        flash_delay: Duration,
        flashes: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    /// Scripted fleet: `list_devices` pops snapshots until one remains,
    /// which then repeats forever.
    #[derive(Clone)]
    struct MockDirectory {
        state: Arc<MockState>,
    }

    fn mock(
        snapshots: Vec<Snapshot>,
        fail_enter: &[&'static str],
        fail_flash: &[&'static str],
        flash_delay: Duration,
    ) -> MockDirectory {
        MockDirectory {
            state: Arc::new(MockState {
                snapshots: Mutex::new(snapshots.into()),
                enter_commands: Mutex::new(Vec::new()),
                fail_enter: fail_enter.iter().copied().collect(),
                fail_flash: fail_flash.iter().copied().collect(),
                flash_delay,
                flashes: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    impl DeviceDirectory for MockDirectory {
        type Handle = MockDevice;

        fn list_devices(&self) -> Result<Vec<MockDevice>, SdkError> {
            let mut snapshots = self.state.snapshots.lock().unwrap();
            let snapshot = if snapshots.len() > 1 {
                snapshots.pop_front().unwrap()
            } else {
                snapshots.front().cloned().unwrap_or(Ok(Vec::new()))
            };
            snapshot.map_err(|msg| SdkError::new("list_devices", "", msg))
        }

        fn attribute(
            &self,
            device: &MockDevice,
            attribute: DeviceAttribute,
        ) -> Result<Option<String>, SdkError> {
            Ok(match attribute {
                DeviceAttribute::SerialNumber => {
                    device.serial.map(str::to_owned)
                }
                DeviceAttribute::UpdateId => {
                    device.update_id.map(str::to_owned)
                }
            })
        }

        fn update_capable(&self, device: &MockDevice) -> bool {
            device.capable
        }

        fn in_update_mode(&self, device: &MockDevice) -> bool {
            device.in_update_mode
        }

        fn enter_update_mode(
            &self,
            device: &MockDevice,
        ) -> Result<(), SdkError> {
            let id = device.update_id.unwrap_or("?");
            self.state.enter_commands.lock().unwrap().push(id.to_owned());
            if self.state.fail_enter.contains(id) {
                return Err(SdkError::new(
                    "enter_update_mode",
                    id,
                    "device rejected the request",
                ));
            }
            Ok(())
        }

        fn flash(
            &self,
            device: &MockDevice,
            _image: &[u8],
        ) -> Result<(), SdkError> {
            let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.state.flash_delay.is_zero() {
                std::thread::sleep(self.state.flash_delay);
            }
            self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.state.flashes.fetch_add(1, Ordering::SeqCst);

            let id = device.update_id.unwrap_or("?");
            if self.state.fail_flash.contains(id) {
                return Err(SdkError::new("flash", id, "write failed"));
            }
            Ok(())
        }
    }

    fn fast_config(max_concurrent: usize) -> UpdateConfig {
        UpdateConfig {
            max_concurrent,
            poll_interval: Duration::from_millis(5),
            convergence_timeout: Duration::from_millis(25),
            relist_attempts: 3,
        }
    }

    fn test_image(dir: &tempfile::TempDir) -> FirmwareImage {
        let path = dir.path().join("a_b_c_1_0_0_0.bin");
        fs::write(&path, [0xA5u8; 32]).unwrap();
        FirmwareImage::load(&path).unwrap()
    }

    fn orchestrator(
        directory: MockDirectory,
        max_concurrent: usize,
    ) -> UpdateOrchestrator<MockDirectory> {
        UpdateOrchestrator::with_config(
            directory,
            fast_config(max_concurrent),
            OutputSink::new(io::sink()),
        )
    }

    #[tokio::test]
    async fn test_no_devices_aborts_before_any_command() {
        let dir = tempfile::tempdir().unwrap();
        let image = test_image(&dir);
        let directory = mock(vec![Ok(vec![])], &[], &[], Duration::ZERO);
        let result = orchestrator(directory.clone(), 4).run(&image).await;

        assert!(matches!(result, Err(UpdateError::NoDevices)));
        assert!(directory.state.enter_commands.lock().unwrap().is_empty());
        assert_eq!(directory.state.flashes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enter_update_mode_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let image = test_image(&dir);
        let directory = mock(
            vec![Ok(vec![normal("s1", "u1"), normal("s2", "u2")])],
            &["u2"],
            &[],
            Duration::ZERO,
        );
        let result = orchestrator(directory.clone(), 4).run(&image).await;

        match result {
            Err(UpdateError::EnterUpdateMode { index, .. }) => {
                assert_eq!(index, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        // no partial flashing
        assert_eq!(directory.state.flashes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_convergence_timeout_proceeds_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let image = test_image(&dir);
        // The fleet never reports update mode.
        let directory = mock(
            vec![Ok(vec![normal("s1", "u1"), normal("s2", "u2")])],
            &[],
            &[],
            Duration::ZERO,
        );
        let report =
            orchestrator(directory.clone(), 4).run(&image).await.unwrap();

        assert_eq!(report.skipped(), 2);
        assert_eq!(report.updated(), 0);
        assert_eq!(directory.state.flashes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_flashes_never_exceed_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let image = test_image(&dir);
        let fleet: Vec<MockDevice> = ["u1", "u2", "u3", "u4", "u5", "u6"]
            .iter()
            .copied()
            .map(recovery)
            .collect();
        let directory =
            mock(vec![Ok(fleet)], &[], &[], Duration::from_millis(30));
        let report =
            orchestrator(directory.clone(), 2).run(&image).await.unwrap();

        assert_eq!(report.updated(), 6);
        assert_eq!(directory.state.flashes.load(Ordering::SeqCst), 6);
        assert!(directory.state.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_flash_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let image = test_image(&dir);
        let directory = mock(
            vec![Ok(vec![recovery("u1"), recovery("u2"), recovery("u3")])],
            &[],
            &["u2"],
            Duration::ZERO,
        );
        let report =
            orchestrator(directory.clone(), 4).run(&image).await.unwrap();

        assert_eq!(report.updated(), 2);
        assert_eq!(report.failed(), 1);
        let failed = report
            .devices
            .iter()
            .find(|d| matches!(d.outcome, FlashOutcome::Failed(_)))
            .unwrap();
        assert_eq!(failed.label, "u2");
    }

    #[tokio::test]
    async fn test_labels_resolve_through_the_identity_map() {
        let dir = tempfile::tempdir().unwrap();
        let image = test_image(&dir);
        let unmapped = MockDevice {
            serial: None,
            update_id: Some("F00ZZZZZ"),
            capable: true,
            in_update_mode: false,
        };
        let directory = mock(
            vec![
                Ok(vec![normal("829212070538", "F0090210"), unmapped]),
                Ok(vec![recovery("F0090210"), recovery("F00ZZZZZ")]),
            ],
            &[],
            &[],
            Duration::ZERO,
        );
        let report =
            orchestrator(directory.clone(), 4).run(&image).await.unwrap();

        assert_eq!(report.updated(), 2);
        let labels: HashSet<&str> = report
            .devices
            .iter()
            .map(|d| d.label.as_str())
            .collect();
        // mapped device shows its serial, unmapped one its raw id
        assert!(labels.contains("829212070538"));
        assert!(labels.contains("F00ZZZZZ"));
    }

    #[tokio::test]
    async fn test_stalled_relist_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let image = test_image(&dir);
        // Two devices found, only one ever comes back.
        let directory = mock(
            vec![
                Ok(vec![normal("s1", "u1"), normal("s2", "u2")]),
                Ok(vec![recovery("u1")]),
            ],
            &[],
            &[],
            Duration::ZERO,
        );
        let result = orchestrator(directory.clone(), 4).run(&image).await;

        match result {
            Err(UpdateError::ConvergenceStalled { seen, expected }) => {
                assert_eq!(seen, 1);
                assert_eq!(expected, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(directory.state.flashes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_relist_recovers_from_a_short_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let image = test_image(&dir);
        let directory = mock(
            vec![
                Ok(vec![normal("s1", "u1"), normal("s2", "u2")]),
                Ok(vec![recovery("u1"), recovery("u2")]),
                Ok(vec![recovery("u1")]),
                Ok(vec![recovery("u1"), recovery("u2")]),
            ],
            &[],
            &[],
            Duration::ZERO,
        );
        let report =
            orchestrator(directory.clone(), 4).run(&image).await.unwrap();

        assert_eq!(report.updated(), 2);
    }

    #[tokio::test]
    async fn test_transient_enumeration_errors_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let image = test_image(&dir);
        let directory = mock(
            vec![
                Ok(vec![normal("s1", "u1")]),
                Err("bus reset in progress"),
                Ok(vec![recovery("u1")]),
            ],
            &[],
            &[],
            Duration::ZERO,
        );
        let report =
            orchestrator(directory.clone(), 4).run(&image).await.unwrap();

        assert_eq!(report.updated(), 1);
    }
}
