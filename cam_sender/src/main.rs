//! Send webcam frames to the classify server.
//!
use anyhow::Result;
use cam_sender::sensors::get_capture_fn_linux;
use clap::Parser;
use common::protocol::{FrameMsg, ProtoMsg};
use env_logger::TimestampPrecision;
use futures::sink::SinkExt;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address of the classify server frame socket
    #[clap(long, default_value = "127.0.0.1:3001")]
    address: String,

    /// Channel name that this sender publishes to
    #[clap(long, default_value = "webcam")]
    channel: String,

    /// Video device to capture from
    #[clap(long, default_value = "/dev/video0")]
    device: String,

    /// Capture width, the camera maximum if not given
    #[clap(long, requires = "height")]
    width: Option<u32>,

    /// Capture height, the camera maximum if not given
    #[clap(long, requires = "width")]
    height: Option<u32>,

    /// Frames per second, the camera maximum if not given
    #[clap(long)]
    fps: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    log::info!("Launching socket sender for channel {}", &args.channel);

    // Initialize webcam to send image stream
    let resolution = args.width.zip(args.height);
    let frame_rate = args.fps.map(|fps| (1, fps));
    let capture_fn = get_capture_fn_linux(&args.device, "MJPG", resolution, frame_rate)?;

    let stream = TcpStream::connect(&args.address).await?;
    log::info!("Connected to {}", &args.address);

    // Wrap stream in transport handler with length-delimited codec
    let mut transport = Framed::new(stream, LengthDelimitedCodec::new());

    // Send init message
    let init_msg = ProtoMsg::ConnectReq(args.channel.clone()).serialize()?;
    transport.send(bytes::Bytes::from(init_msg)).await?;

    // Send captured frames in a loop
    loop {
        match capture_fn() {
            Ok(frame) => {
                let data = ProtoMsg::FrameMsg(FrameMsg::new(args.channel.clone(), frame[..].to_vec()))
                    .serialize()?;
                transport.send(bytes::Bytes::from(data)).await?;
            }
            Err(err) => log::error!("Unable to capture frame, trying again... ({err})"),
        }
    }
}
