use std::sync::Arc;

use llm_relay::prelude::*;

const ANTHROPIC_FIXTURE: &str = concat!(
    "event: content_block_delta\n",
    "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"Need the weather first.\"}}\n\n",
    "event: content_block_start\n",
    "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"weather\",\"input\":{\"city\":\"Oslo\"}}}\n\n",
    "event: content_block_delta\n",
    "data: {\"type\":\"content_block_delta\",\"index\":2,\"delta\":{\"type\":\"text_delta\",\"text\":\"Checking Oslo now.\"}}\n\n",
    "event: message_stop\n",
    "data: {\"type\":\"message_stop\"}\n\n",
);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), StreamError> {
    llm_relay::init_observability();

    let registry = Arc::new(InMemoryToolRegistry::new());
    registry.register("weather", |args: llm_relay::ToolArguments| async move {
        let city = args
            .to_json()
            .and_then(|v| v["city"].as_str().map(str::to_string))
            .unwrap_or_default();
        Ok(serde_json::json!({ "city": city, "forecast": "snow" }))
    });
    let dispatcher = Arc::new(ToolDispatcher::new(registry, Reporter::tracing(None)));

    let tracker = ThinkingTracker::new();
    let subscription = tracker.subscribe(|snap| {
        if snap.is_thinking {
            eprintln!("[step {}] {}", snap.step, snap.current_action);
        }
    });

    let session = StreamSession::new(RelayConfig::new(ProviderKind::Anthropic))
        .with_dispatcher(dispatcher.clone());
    let tool_tracker = tracker.clone();
    let callbacks = Callbacks::new()
        .with_thinking(|text| eprintln!("thinking: {text}"))
        .with_token(|text| print!("{text}"))
        .with_tool_call(move |call| tool_tracker.set_action(format!("Calling {}", call.name)));

    tracker.start_thinking("Streaming response");
    let mut transport = ByteStreamTransport::from_bytes_chunked(ANTHROPIC_FIXTURE, 17);
    let result = session.handle(&mut transport, &callbacks).await?;
    println!();

    for (call, outcome) in dispatcher.join_all().await {
        match outcome {
            Ok(output) => println!("{} -> {}", call.name, output.result),
            Err(err) => eprintln!("{} failed: {err}", call.name),
        }
    }
    tracker.stop_thinking();
    subscription.unsubscribe();

    println!("finish_reason={} tool_calls={}", result.finish_reason, result.tool_calls.len());
    Ok(())
}
