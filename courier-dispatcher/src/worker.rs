//! Dispatcher worker pool
//!
//! Workers pull control requests off the queue and execute them: resolve
//! the flow's endpoints, run the values through the best-matching filter
//! pipeline and deliver the result downstream. A failure inside a single
//! request is logged with its correlation id and never takes the worker
//! down.

use courier_client::delivery::{operation_payload, write_payload, OPERATION_PATH, SETPOINT_PATH};
use courier_core::domain::{CallerIdentity, ControlIntent, ControlRequest, Endpoint, KvList};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::automation::Script;
use crate::context::ServiceContext;
use crate::pipeline::FilterOutcome;
use crate::queue::{QueuedRequest, RequestQueue};
use crate::repository::asset_repository;

/// Start the dispatcher worker pool
pub fn spawn_workers(
    ctx: Arc<ServiceContext>,
    queue: Arc<RequestQueue>,
    count: usize,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker| {
            let ctx = Arc::clone(&ctx);
            let queue = Arc::clone(&queue);
            tokio::spawn(worker_loop(worker, ctx, queue))
        })
        .collect()
}

async fn worker_loop(worker: usize, ctx: Arc<ServiceContext>, queue: Arc<RequestQueue>) {
    debug!("Dispatcher worker {} started", worker);
    while let Some(entry) = queue.next().await {
        let id = entry.id;
        let kind = entry.request.intent.kind();
        if let Err(e) = execute_request(&ctx, entry).await {
            tracing::error!("Control request {} ({}) failed: {:#}", id, kind, e);
        }
    }
    debug!("Dispatcher worker {} stopped", worker);
}

/// Execute one queued control request
pub async fn execute_request(ctx: &ServiceContext, entry: QueuedRequest) -> anyhow::Result<()> {
    let QueuedRequest {
        id,
        queued_at,
        request,
    } = entry;
    let waited = chrono::Utc::now().signed_duration_since(queued_at);
    debug!(
        %id,
        kind = request.intent.kind(),
        waited_ms = waited.num_milliseconds(),
        "Executing control request"
    );

    let source = resolve_source(ctx, &request).await;
    let caller = request.caller;

    match request.intent {
        ControlIntent::WriteService { service, values } => {
            deliver_write(
                ctx,
                &caller,
                &source,
                &Endpoint::service(&service),
                &service,
                values,
            )
            .await
            .map(|_| ())
        }
        ControlIntent::WriteAsset { asset, values } => {
            let service = asset_repository::ingest_service(&ctx.pool, &asset)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No ingest service found for asset '{}'", asset))?;
            deliver_write(
                ctx,
                &caller,
                &source,
                &Endpoint::asset(&asset),
                &service,
                values,
            )
            .await
            .map(|_| ())
        }
        ControlIntent::WriteBroadcast { values } => {
            let dest = Endpoint::broadcast();
            match apply_pipeline(ctx, &source, &dest, values).await {
                Some(values) => {
                    ctx.downstream
                        .broadcast(SETPOINT_PATH, &write_payload(&values), &caller)
                        .await
                }
                None => Ok(()),
            }
        }
        ControlIntent::WriteScript { script, values } => {
            let mut script = Script::new(script, caller);
            script.execute(ctx, &values, 0).await?;
            Ok(())
        }
        ControlIntent::OperationService {
            operation,
            service,
            parameters,
        } => deliver_operation(
            ctx,
            &caller,
            &source,
            &Endpoint::service(&service),
            &service,
            &operation,
            parameters,
        )
        .await
        .map(|_| ()),
        ControlIntent::OperationAsset {
            operation,
            asset,
            parameters,
        } => {
            let service = asset_repository::ingest_service(&ctx.pool, &asset)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No ingest service found for asset '{}'", asset))?;
            deliver_operation(
                ctx,
                &caller,
                &source,
                &Endpoint::asset(&asset),
                &service,
                &operation,
                parameters,
            )
            .await
            .map(|_| ())
        }
        ControlIntent::OperationBroadcast {
            operation,
            parameters,
        } => {
            let dest = Endpoint::broadcast();
            match apply_pipeline(ctx, &source, &dest, parameters).await {
                Some(parameters) => {
                    ctx.downstream
                        .broadcast(
                            OPERATION_PATH,
                            &operation_payload(&operation, &parameters),
                            &caller,
                        )
                        .await
                }
                None => Ok(()),
            }
        }
    }
}

/// The source endpoint of a request: the body hint when present, else the
/// authenticated caller, else the wildcard
async fn resolve_source(ctx: &ServiceContext, request: &ControlRequest) -> Endpoint {
    if let Some(hint) = &request.source_hint {
        return hint.clone();
    }
    let caller = &request.caller;
    if !caller.is_anonymous() {
        if let Some(kind) = ctx.manager.source_kind(&caller.source_type).await {
            return Endpoint::from_parts(kind, caller.source_name.clone());
        }
    }
    Endpoint::any()
}

/// Run a value bundle through the best-matching pipeline for the flow.
/// Returns None when a filter dropped the request; a flow with no matching
/// pipeline, or with an unloadable one, passes through unchanged.
pub async fn apply_pipeline(
    ctx: &ServiceContext,
    source: &Endpoint,
    dest: &Endpoint,
    values: KvList,
) -> Option<KvList> {
    let Some(pipeline) = ctx.manager.find_pipeline(source, dest).await else {
        return Some(values);
    };
    debug!(
        "Control flow {} -> {} uses pipeline '{}'",
        source,
        dest,
        pipeline.name()
    );

    let context = pipeline.get_execution_context(source, dest).await;
    let asset = if dest.name().is_empty() {
        "control"
    } else {
        dest.name()
    };
    match context.filter(values.to_reading(asset)).await {
        FilterOutcome::Unfiltered => Some(values),
        FilterOutcome::Filtered(reading) => {
            let mut filtered = KvList::new();
            filtered.from_reading(&reading);
            Some(filtered)
        }
        FilterOutcome::Dropped => None,
    }
}

/// Filter a value bundle for the given flow and PUT it to the service's
/// setpoint endpoint. Returns false when the pipeline dropped the write.
pub async fn deliver_write(
    ctx: &ServiceContext,
    caller: &CallerIdentity,
    source: &Endpoint,
    dest: &Endpoint,
    service: &str,
    values: KvList,
) -> anyhow::Result<bool> {
    match apply_pipeline(ctx, source, dest, values).await {
        Some(values) => {
            ctx.downstream
                .send_to_service(service, SETPOINT_PATH, &write_payload(&values), caller)
                .await?;
            Ok(true)
        }
        None => {
            info!("Filter pipeline dropped control write to service '{}'", service);
            Ok(false)
        }
    }
}

/// Filter operation parameters for the given flow and PUT the operation to
/// the service. Returns false when the pipeline dropped the operation.
#[allow(clippy::too_many_arguments)]
pub async fn deliver_operation(
    ctx: &ServiceContext,
    caller: &CallerIdentity,
    source: &Endpoint,
    dest: &Endpoint,
    service: &str,
    operation: &str,
    parameters: KvList,
) -> anyhow::Result<bool> {
    match apply_pipeline(ctx, source, dest, parameters).await {
        Some(parameters) => {
            ctx.downstream
                .send_to_service(
                    service,
                    OPERATION_PATH,
                    &operation_payload(operation, &parameters),
                    caller,
                )
                .await?;
            Ok(true)
        }
        None => {
            info!(
                "Filter pipeline dropped operation '{}' for service '{}'",
                operation, service
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use courier_core::domain::Endpoint;
    use serde_json::json;

    fn write_request(service: &str, key: &str, value: &str) -> ControlRequest {
        let mut values = KvList::new();
        values.add(key, value);
        ControlRequest::new(
            CallerIdentity::default(),
            None,
            ControlIntent::WriteService {
                service: service.to_string(),
                values,
            },
        )
    }

    fn payload_json(payload: &str) -> serde_json::Value {
        serde_json::from_str(payload).expect("payload is JSON")
    }

    #[tokio::test]
    async fn test_single_worker_preserves_order() {
        let harness = testutil::harness();
        let queue = Arc::new(RequestQueue::new());

        for value in ["1", "2", "3"] {
            queue.queue(write_request("A", "x", value)).unwrap();
        }

        let workers = spawn_workers(Arc::clone(&harness.ctx), Arc::clone(&queue), 1);
        queue.shutdown();
        for handle in workers {
            handle.await.unwrap();
        }

        let sends = harness.downstream.sends();
        assert_eq!(sends.len(), 3);
        for (send, expected) in sends.iter().zip(["1", "2", "3"]) {
            assert_eq!(send.0, "A");
            assert_eq!(send.1, SETPOINT_PATH);
            assert_eq!(payload_json(&send.2), json!({"values": {"x": expected}}));
        }
    }

    #[tokio::test]
    async fn test_workers_drain_queue_exactly_once() {
        let harness = testutil::harness();
        let queue = Arc::new(RequestQueue::new());

        for i in 0..20 {
            queue
                .queue(write_request("A", "n", &i.to_string()))
                .unwrap();
        }

        let workers = spawn_workers(Arc::clone(&harness.ctx), Arc::clone(&queue), 4);
        queue.shutdown();
        for handle in workers {
            handle.await.unwrap();
        }

        // Every request delivered once, none lost, none duplicated
        let mut seen: Vec<String> = harness
            .downstream
            .sends()
            .iter()
            .map(|(_, _, payload)| payload_json(payload)["values"]["n"]
                .as_str()
                .unwrap()
                .to_string())
            .collect();
        seen.sort_by_key(|n| n.parse::<u32>().unwrap());
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_write_runs_through_matching_pipeline() {
        let harness = testutil::harness();
        testutil::add_tag_filter(&harness, "F1", "t1");
        let pipeline = harness.manager.build_pipeline(
            1,
            "P",
            Endpoint::any(),
            Endpoint::service("pump"),
            true,
            false,
            vec!["F1".to_string()],
        );
        harness.manager.insert_pipeline(pipeline).await;

        execute_request(
            &harness.ctx,
            crate::queue::QueuedRequest::new(write_request("pump", "x", "1")),
        )
        .await
        .unwrap();

        let sends = harness.downstream.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(
            payload_json(&sends[0].2),
            json!({"values": {"x": "1", "via_t1": "1"}})
        );
    }

    #[tokio::test]
    async fn test_pipeline_can_drop_a_write() {
        let harness = testutil::harness();
        harness.registry.register("sink", testutil::drop_filter());
        harness.core.put_category(
            courier_core::dto::registry::Category::named("F1").with_item("plugin", "sink"),
        );
        let pipeline = harness.manager.build_pipeline(
            1,
            "P",
            Endpoint::any(),
            Endpoint::any(),
            true,
            false,
            vec!["F1".to_string()],
        );
        harness.manager.insert_pipeline(pipeline).await;

        execute_request(
            &harness.ctx,
            crate::queue::QueuedRequest::new(write_request("pump", "x", "1")),
        )
        .await
        .unwrap();

        assert!(harness.downstream.sends().is_empty());
    }

    #[tokio::test]
    async fn test_operation_delivery_payload() {
        let harness = testutil::harness();
        let mut parameters = KvList::new();
        parameters.add("delay", "5");
        let request = ControlRequest::new(
            CallerIdentity::default(),
            None,
            ControlIntent::OperationService {
                operation: "reboot".to_string(),
                service: "pump".to_string(),
                parameters,
            },
        );

        execute_request(&harness.ctx, crate::queue::QueuedRequest::new(request))
            .await
            .unwrap();

        let sends = harness.downstream.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].1, OPERATION_PATH);
        assert_eq!(
            payload_json(&sends[0].2),
            json!({"operation": "reboot", "parameters": {"delay": "5"}})
        );
    }

    #[tokio::test]
    async fn test_broadcast_write_fans_out_downstream() {
        let harness = testutil::harness();
        let mut values = KvList::new();
        values.add("x", "1");
        let request = ControlRequest::new(
            CallerIdentity::default(),
            None,
            ControlIntent::WriteBroadcast { values },
        );

        execute_request(&harness.ctx, crate::queue::QueuedRequest::new(request))
            .await
            .unwrap();

        let sends = harness.downstream.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, "<broadcast>");
        assert_eq!(sends[0].1, SETPOINT_PATH);
    }

    #[tokio::test]
    async fn test_source_hint_drives_pipeline_matching() {
        let harness = testutil::harness();
        testutil::add_tag_filter(&harness, "F1", "t1");
        // Only flows from the schedule source are filtered
        let pipeline = harness.manager.build_pipeline(
            1,
            "P",
            Endpoint::schedule("nightly"),
            Endpoint::any(),
            true,
            false,
            vec!["F1".to_string()],
        );
        harness.manager.insert_pipeline(pipeline).await;

        let mut values = KvList::new();
        values.add("x", "1");
        let hinted = ControlRequest::new(
            CallerIdentity::default(),
            Some(Endpoint::schedule("nightly")),
            ControlIntent::WriteService {
                service: "pump".to_string(),
                values: values.clone(),
            },
        );
        execute_request(&harness.ctx, crate::queue::QueuedRequest::new(hinted))
            .await
            .unwrap();

        let unhinted = write_request("pump", "x", "1");
        execute_request(&harness.ctx, crate::queue::QueuedRequest::new(unhinted))
            .await
            .unwrap();

        let sends = harness.downstream.sends();
        assert_eq!(sends.len(), 2);
        // The hinted flow was filtered, the anonymous one was not
        assert_eq!(
            payload_json(&sends[0].2),
            json!({"values": {"x": "1", "via_t1": "1"}})
        );
        assert_eq!(payload_json(&sends[1].2), json!({"values": {"x": "1"}}));
    }
}
