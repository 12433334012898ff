//! WebSocket transport: one pipeline per client connection.
//!
//! Binary frames from the client are audio input. Every pipeline event is
//! sent back as a JSON text frame. A client disconnect or send failure drops
//! the pipeline output, which cancels every stage.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::pipeline::{AudioStream, VoicePipeline};

/// Builds a fresh pipeline (new session, new collaborator connections) for
/// each accepted client.
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    async fn create(&self) -> Result<VoicePipeline>;
}

/// Accept loop for voice clients.
pub struct VoiceServer {
    listener: TcpListener,
    factory: Arc<dyn PipelineFactory>,
}

impl VoiceServer {
    pub async fn bind(addr: &str, factory: Arc<dyn PipelineFactory>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, factory })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process stops.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then cancel every open connection.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(addr = ?self.listener.local_addr().ok(), "voice server listening");
        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(error) => {
                            warn!(%error, "accept failed");
                            continue;
                        }
                    };
                    let factory = Arc::clone(&self.factory);
                    connections.spawn(async move {
                        if let Err(error) = handle_connection(stream, factory).await {
                            warn!(%peer, %error, "connection ended with error");
                        }
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        info!(open = connections.len(), "voice server shutting down");
        connections.shutdown().await;
        Ok(())
    }
}

/// Run one client connection to completion.
pub async fn handle_connection(stream: TcpStream, factory: Arc<dyn PipelineFactory>) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let socket = accept_async(stream).await?;
    let (mut sink, source) = socket.split();

    let pipeline = match factory.create().await {
        Ok(pipeline) => pipeline,
        Err(error) => {
            let _ = sink.send(Message::Close(None)).await;
            return Err(error);
        }
    };
    let session = pipeline.session();
    info!(%session, ?peer, "client connected");

    let mut output = pipeline.run(client_audio(source));
    let mut outcome = Ok(());
    while let Some(item) = output.next().await {
        let event = match item {
            Ok(event) => event,
            Err(error) => {
                warn!(%session, %error, category = ?error.category(), "pipeline failed");
                outcome = Err(error);
                break;
            }
        };
        let frame = match event.to_wire() {
            Ok(frame) => frame,
            Err(error) => {
                outcome = Err(error);
                break;
            }
        };
        if let Err(error) = sink.send(Message::Text(frame)).await {
            debug!(%session, %error, "client gone, cancelling pipeline");
            break;
        }
    }

    drop(output);
    let _ = sink.close().await;
    info!(%session, "client disconnected");
    outcome
}

fn client_audio(mut source: SplitStream<WebSocketStream<TcpStream>>) -> AudioStream {
    Box::pin(async_stream::stream! {
        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Binary(frame)) => yield frame,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(error) => {
                    debug!(%error, "client read failed, ending audio input");
                    break;
                }
            }
        }
    })
}
