//! Sensors module.
//!
use anyhow::Result;
use rscam::{Camera, Config, Frame};
use simple_error::simple_error;

pub type CaptureFn = Box<dyn Fn() -> std::io::Result<Frame> + Send + Sync>;

/// Get a capture function to a video device on a Linux machine.
///
/// Without an explicit resolution or frame rate, the maximum the camera supports for `format` is
/// used.
pub fn get_capture_fn_linux(
    device_name: &str,
    format: &str,
    resolution: Option<(u32, u32)>,
    frame_rate: Option<(u32, u32)>,
) -> Result<CaptureFn> {
    let mut cam = Camera::new(device_name)?;
    log_supported_formats(&cam, format);
    let format = format.as_bytes();

    let resolution = resolution
        .map(Ok)
        .unwrap_or_else(|| get_max_resolution(&cam, format))?;

    let frame_rate = frame_rate
        .map(Ok)
        .unwrap_or_else(|| get_max_frame_rate(&cam, format, resolution))?;

    log::info!(
        "Using camera {} at {}x{}, interval {}/{}s",
        device_name,
        resolution.0,
        resolution.1,
        frame_rate.0,
        frame_rate.1
    );

    cam.start(&Config {
        interval: frame_rate,
        resolution,
        format,
        ..Default::default()
    })?;

    let callback = move || cam.capture();
    Ok(Box::new(callback))
}

/// Get the maximum supported resolution for the given format.
fn get_max_resolution(cam: &Camera, format: &[u8]) -> Result<(u32, u32)> {
    let resolution_info = cam.resolutions(format)?;
    log::debug!("Found resolutions: {:?}", &resolution_info);
    max_resolution(&resolution_info).ok_or_else(|| simple_error!("No resolution found").into())
}

fn max_resolution(resolution_info: &rscam::ResolutionInfo) -> Option<(u32, u32)> {
    match resolution_info {
        rscam::ResolutionInfo::Discretes(resolutions) => resolutions
            .iter()
            // Highest resolution in terms of number of pixels
            .max_by_key(|res| res.0 * res.1)
            .copied(),
        rscam::ResolutionInfo::Stepwise { max, .. } => Some(*max),
    }
}

/// Get the maximum supported frame rate for the given format and resolution.
fn get_max_frame_rate(cam: &Camera, format: &[u8], resolution: (u32, u32)) -> Result<(u32, u32)> {
    let interval_info = cam.intervals(format, resolution)?;
    log::debug!("Found frame rates: {:?}", &interval_info);
    max_frame_rate(&interval_info).ok_or_else(|| simple_error!("No frame rate found").into())
}

/// Shortest frame interval, given as `(numerator, denominator)` seconds.
fn max_frame_rate(interval_info: &rscam::IntervalInfo) -> Option<(u32, u32)> {
    match interval_info {
        rscam::IntervalInfo::Discretes(intervals) => intervals
            .iter()
            .filter(|(num, _denom)| *num > 0)
            .max_by(|(num_a, denom_a), (num_b, denom_b)| {
                // Compare denom_a / num_a with denom_b / num_b without rounding
                (*denom_a as u64 * *num_b as u64).cmp(&(*denom_b as u64 * *num_a as u64))
            })
            .copied(),
        rscam::IntervalInfo::Stepwise { min, .. } => Some(*min),
    }
}

fn log_supported_formats(cam: &Camera, format: &str) {
    let formats: Vec<_> = cam.formats().filter_map(|fmt| fmt.ok()).collect();
    log::debug!(
        "Supported formats: {:?}, using format {:?}",
        formats,
        format
    );
}
