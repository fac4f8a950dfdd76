//! Data socket module to receive image streams via network.
//!
use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{anyhow, bail, Result};
use common::protocol::ProtoMsg;
use futures::StreamExt;
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::{meter::METER, router::FrameRouter};

/// Listen for frame senders on `addr`.
///
/// Returns the bound address, which differs from `addr` when binding to port 0.
pub async fn spawn_data_socket(
    router: Arc<FrameRouter>,
    addr: &str,
) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
    let socket: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(socket).await?;
    let local_addr = listener.local_addr()?;
    log::info!("Listening for frames on {}", &local_addr);

    let handle = tokio::spawn(accept_connections(listener, router));

    Ok((local_addr, handle))
}

/// Drive `server` until it finishes or the frame socket task stops.
pub async fn serve_with_ingest<F>(server: F, ingest: JoinHandle<Result<()>>) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::select! {
        res = server => res,
        res = ingest => match res {
            Ok(Ok(())) => bail!("frame socket closed"),
            Ok(Err(err)) => Err(err.context("frame socket failed")),
            Err(err) => Err(anyhow!(err).context("frame socket task aborted")),
        },
    }
}

async fn accept_connections(listener: TcpListener, router: Arc<FrameRouter>) -> Result<()> {
    loop {
        let (socket, _peer_addr) = listener.accept().await?;
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            if let Err(err) = handle_incoming(router, socket).await {
                log::warn!("Connection closed with error: {err}");
            }
        });
    }
}

async fn handle_incoming(router: Arc<FrameRouter>, stream: TcpStream) -> Result<()> {
    let addr = stream.peer_addr()?;
    log::info!("{}: New TCP connection", &addr);

    let mut transport = Framed::new(stream, LengthDelimitedCodec::new());

    while let Some(data) = transport.next().await {
        match ProtoMsg::deserialize(&data?) {
            Ok(ProtoMsg::ConnectReq(channel)) => {
                log::info!("{}: Publishing on channel {}", &addr, &channel);
            }
            Ok(ProtoMsg::FrameMsg(frame_msg)) => {
                METER.tick_raw();
                router.route(frame_msg);
            }
            Err(err) => log::warn!("{}: Dropping malformed message: {err}", &addr),
        }
    }

    log::info!("{}: Connection closed", &addr);

    Ok(())
}
