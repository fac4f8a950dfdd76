//! Classify server binary.
//!
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use classify_server::{
    data_socket::{serve_with_ingest, spawn_data_socket},
    endpoints::{app, LabelRanking},
    infer_channel,
    inferer::Inferer,
    meter::spawn_meter_logger,
    nn::{default_model_dir, download_labels, ClassifierVariant, OnnxClassifier},
    overlay::Overlay,
    pipeline::Classifier,
    router::{FrameRouter, StreamSink},
};
use common::labels::Vocabulary;
use env_logger::TimestampPrecision;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve HTTP on
    #[clap(long, default_value = "127.0.0.1:3000")]
    server_address: String,

    /// Address to receive camera frames on
    #[clap(long, default_value = "127.0.0.1:3001")]
    socket_address: String,

    /// Classification model to run
    #[clap(long, value_enum, default_value = "mobilenet-v2")]
    variant: ClassifierVariant,

    /// Number of predictions drawn onto frames and returned by default
    #[clap(long, default_value_t = 10)]
    top_k: usize,

    /// Label file with one class name per line, downloaded if not given
    #[clap(long)]
    labels: Option<PathBuf>,

    /// Directory to cache models and labels in
    #[clap(long)]
    model_dir: Option<PathBuf>,

    /// TrueType font for the overlay text, only score bars are drawn without it
    #[clap(long)]
    font: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let model_dir = args.model_dir.unwrap_or_else(default_model_dir);
    let labels_path = match args.labels {
        Some(path) => path,
        None => download_labels(&model_dir).await?,
    };
    let vocabulary = Arc::new(Vocabulary::from_path(labels_path)?);

    let source = OnnxClassifier::new(args.variant, &model_dir).await?;
    let classifier = Classifier::new(source, Arc::clone(&vocabulary), args.top_k)?;

    let overlay = match args.font {
        Some(path) => Overlay::from_font_file(path)?,
        None => {
            log::warn!("No font given, predictions are drawn without labels");
            Overlay::new()
        }
    };

    let (infer_tx, infer_rx) = infer_channel();
    let frame_router = Arc::new(FrameRouter::new(infer_tx));

    // Run the classification of incoming frames in a separate task
    {
        let sink = StreamSink::new(Arc::clone(&frame_router), overlay);
        let mut inferer = Inferer::new(infer_rx, classifier, sink);
        tokio::spawn(async move { inferer.run().await });
    }

    // Create socket to receive image streams via network
    let (_socket_addr, ingest) =
        spawn_data_socket(Arc::clone(&frame_router), &args.socket_address).await?;

    spawn_meter_logger();

    // Build HTTP server with endpoints
    let labels = LabelRanking {
        vocabulary,
        default_k: args.top_k,
    };
    let app = app(frame_router, labels);

    // Serve HTTP server
    let addr: SocketAddr = args.server_address.parse()?;
    log::info!("Serving HTTP on {}", &addr);
    let server = async move {
        axum::Server::bind(&addr)
            .serve(app.into_make_service())
            .await?;
        Ok::<_, anyhow::Error>(())
    };

    // Exit when either HTTP serving or frame ingestion stops
    serve_with_ingest(server, ingest).await
}
