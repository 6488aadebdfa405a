use depthcam::{DepthCamera, find_depth_cameras};

use crate::CliError;

pub(crate) fn list_cameras(
    vid: Option<u16>,
    pid: Option<u16>,
) -> Result<(), CliError> {
    let cameras = find_depth_cameras(vid, pid)?;
    if cameras.is_empty() {
        println!("No depth cameras found");
    } else {
        print_cameras(&cameras);
    }
    Ok(())
}

fn print_cameras(cameras: &[DepthCamera]) {
    for camera in cameras {
        println!(
            "Bus {} Device {:03}: ID {:04x}:{:04x} serial={} ({})",
            camera.bus_id(),
            camera.device_address(),
            camera.vendor_id(),
            camera.product_id(),
            camera.serial().unwrap_or("?"),
            if camera.in_update_mode() {
                "update mode"
            } else if camera.update_capable() {
                "normal"
            } else {
                "no update interface"
            },
        );
    }
}
