use depth_sense::{runtime::mock::MockRuntime, CloudRes, ColorRes, DepthRes, Device, Error};

fn main() -> Result<(), Error> {
    env_logger::init();

    let mut device = Device::new(MockRuntime::new());

    device.init()?;
    device.init_color(ColorRes::Vga, 30.0)?;
    device.init_depth(DepthRes::Qvga, 30.0, false)?;
    device.enable_point_cloud(CloudRes::Half);
    device.set_point_cloud_range(100.0, 1500.0)?;
    device.start()?;

    for _ in 0..30 {
        if device.update()? {
            log::info!(
                "frame: {} cloud points, color {:?}",
                device.point_cloud().len(),
                device.color_frame().dimensions()
            );
        }
    }

    device.stop();

    Ok(())
}
