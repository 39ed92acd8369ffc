//! Side-by-side comparison of two model variants
//!
//! One worker task per variant streams its reply into a shared bounded
//! channel. A single consumer forwards each chunk downstream tagged with
//! its variant until every worker has finished, one of them fails, the
//! deadline passes, or the client goes away. Any failure aborts the whole
//! comparison and nothing is saved.

use super::events::{DeltaEvent, FinalEvent, FinalUsage, ModelTag, StartEvent, StreamEvent};
use super::{ChatRequest, ChatService};
use crate::config::COMPARE_VARIANT;
use crate::engines::{build_messages, stream_reply, Engine, Message, StreamChunk};
use crate::error::{LexaiError, Result};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// One side of a comparison
pub(crate) struct Lane {
    pub variant: String,
    pub display_name: String,
    pub engine: Arc<dyn Engine>,
}

impl Lane {
    /// Resolve the configured comparison variants, in order
    ///
    /// # Errors
    ///
    /// Returns an unknown-variant error if a compared variant cannot be built
    pub fn resolve(service: &ChatService) -> Result<Vec<Lane>> {
        service
            .config()
            .compare
            .variants
            .iter()
            .map(|variant| -> Result<Lane> {
                let engine = service.registry().get(variant)?;
                Ok(Lane {
                    variant: variant.clone(),
                    display_name: engine.info().display_name.clone(),
                    engine,
                })
            })
            .collect()
    }

    /// Display names joined as `A vs B`
    pub fn label(lanes: &[Lane]) -> String {
        lanes
            .iter()
            .map(|lane| lane.display_name.as_str())
            .collect::<Vec<_>>()
            .join(" vs ")
    }

    fn tag(&self) -> ModelTag {
        ModelTag {
            variant: self.variant.clone(),
            model: self.display_name.clone(),
        }
    }
}

enum WorkerEvent {
    Chunk { variant: String, chunk: StreamChunk },
    Failed { variant: String, message: String },
}

enum CompareAbort {
    Failed {
        variant: Option<String>,
        message: String,
    },
    Disconnected,
}

/// Combine per-variant replies into the stored comparison record
///
/// Sections follow the order of `replies`.
///
/// # Examples
///
/// ```
/// use lexai::chat::compare::combine_replies;
///
/// let combined = combine_replies(&[("A", "one"), ("B", "two")]);
/// assert_eq!(combined, "### A\n\none\n\n### B\n\ntwo");
/// ```
pub fn combine_replies(replies: &[(&str, &str)]) -> String {
    replies
        .iter()
        .map(|(name, reply)| format!("### {}\n\n{}", name, reply))
        .collect::<Vec<_>>()
        .join("\n\n")
}

async fn run_worker(
    variant: String,
    engine: Arc<dyn Engine>,
    messages: Vec<Message>,
    tx: mpsc::Sender<WorkerEvent>,
) {
    let mut stream = match stream_reply(engine, messages).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = tx
                .send(WorkerEvent::Failed {
                    variant,
                    message: e.to_string(),
                })
                .await;
            return;
        }
    };

    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(chunk) => WorkerEvent::Chunk {
                variant: variant.clone(),
                chunk,
            },
            Err(e) => WorkerEvent::Failed {
                variant: variant.clone(),
                message: e.to_string(),
            },
        };
        let failed = matches!(event, WorkerEvent::Failed { .. });
        if tx.send(event).await.is_err() || failed {
            return;
        }
    }
}

/// Drive a comparison and send its events to `tx`
pub(crate) async fn run(
    service: ChatService,
    request: ChatRequest,
    lanes: Vec<Lane>,
    tx: mpsc::Sender<StreamEvent>,
) {
    let label = Lane::label(&lanes);
    let models: Vec<ModelTag> = lanes.iter().map(Lane::tag).collect();
    let generation = service.config().generation;

    let start = StreamEvent::Start(StartEvent {
        model: label.clone(),
        generation_config: generation,
        variant: Some(COMPARE_VARIANT.to_string()),
        models: Some(models.clone()),
    });
    if tx.send(start).await.is_err() {
        return;
    }

    let finished = match collect(&service, &request, &lanes, &models, &tx).await {
        Ok(finished) => finished,
        Err(CompareAbort::Disconnected) => {
            tracing::info!("Client disconnected; aborting comparison");
            return;
        }
        Err(CompareAbort::Failed { variant, message }) => {
            tracing::error!(
                "Comparison aborted ({}): {}",
                variant.as_deref().unwrap_or("all"),
                message
            );
            let _ = tx.send(StreamEvent::error(message, variant)).await;
            return;
        }
    };

    let sections: Vec<(&str, &str)> = lanes
        .iter()
        .filter_map(|lane| {
            finished
                .get(&lane.variant)
                .map(|chunk| (lane.display_name.as_str(), chunk.text.as_str()))
        })
        .collect();
    let combined = combine_replies(&sections);

    let event = match service
        .persist(&request, combined.clone(), Some(label.clone()))
        .await
    {
        Ok(record) => StreamEvent::Final(FinalEvent {
            conversation_id: record.id,
            title: record.title,
            reply: combined,
            disclaimer: service.config().chat.disclaimer.clone(),
            model: label,
            generation_config: generation,
            usage: FinalUsage::PerVariant(
                finished
                    .iter()
                    .map(|(variant, chunk)| (variant.clone(), chunk.usage))
                    .collect(),
            ),
            thinking: None,
            variant: Some(COMPARE_VARIANT.to_string()),
            models: Some(models),
            replies: Some(
                finished
                    .into_iter()
                    .map(|(variant, chunk)| (variant, chunk.text))
                    .collect(),
            ),
        }),
        Err(e) => {
            tracing::error!("Failed to save comparison: {:#}", e);
            StreamEvent::error(e.to_string(), None)
        }
    };
    let _ = tx.send(event).await;
}

/// Fan out to one worker per lane and forward their chunks
///
/// Returns the finished chunk of every lane. Workers still running when
/// this returns are aborted with the join set.
async fn collect(
    service: &ChatService,
    request: &ChatRequest,
    lanes: &[Lane],
    models: &[ModelTag],
    tx: &mpsc::Sender<StreamEvent>,
) -> std::result::Result<BTreeMap<String, StreamChunk>, CompareAbort> {
    let config = service.config();
    let messages = build_messages(&config.chat.system_prompt, &request.history, &request.message);
    let timeout = config.compare.timeout_seconds;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout);

    let (worker_tx, mut worker_rx) = mpsc::channel(config.compare.channel_capacity.max(1));
    let mut workers = JoinSet::new();
    for lane in lanes {
        workers.spawn(run_worker(
            lane.variant.clone(),
            Arc::clone(&lane.engine),
            messages.clone(),
            worker_tx.clone(),
        ));
    }
    drop(worker_tx);

    let mut finished: BTreeMap<String, StreamChunk> = BTreeMap::new();
    while finished.len() < lanes.len() {
        let event = match tokio::time::timeout_at(deadline, worker_rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                return Err(CompareAbort::Failed {
                    variant: None,
                    message: "A comparison worker stopped without finishing".to_string(),
                })
            }
            Err(_) => {
                return Err(CompareAbort::Failed {
                    variant: None,
                    message: LexaiError::Timeout(timeout).to_string(),
                })
            }
        };

        match event {
            WorkerEvent::Failed { variant, message } => {
                return Err(CompareAbort::Failed {
                    variant: Some(variant),
                    message,
                });
            }
            WorkerEvent::Chunk { variant, chunk } => {
                let delta = StreamEvent::Delta(DeltaEvent {
                    text: chunk.text.clone(),
                    delta: chunk.delta.clone(),
                    finished: chunk.finished,
                    usage: chunk.usage,
                    thinking: chunk.thinking.clone(),
                    variant: Some(variant.clone()),
                    models: Some(models.to_vec()),
                });
                if tx.send(delta).await.is_err() {
                    return Err(CompareAbort::Disconnected);
                }
                if chunk.finished {
                    tracing::debug!("Variant '{}' finished", variant);
                    finished.insert(variant, chunk);
                }
            }
        }
    }

    workers.shutdown().await;
    Ok(finished)
}
