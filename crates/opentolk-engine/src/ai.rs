//! AI backend: one chat call, a live stream, or a bounded tool loop.

use std::sync::Arc;

use tracing::{debug, info};

use opentolk_agent::{
    AgentConfig, AgentContext, ChatRequest, LlmResponse, Message, ToolAdapter, run_tool_loop,
};
use opentolk_plugins::AiConfig;

use crate::error::{EngineError, Result};
use crate::output::{Outcome, RunResult};
use crate::runner::Invocation;
use crate::tools::Toolbox;

pub(crate) async fn run(invocation: &Invocation<'_>, config: &AiConfig) -> Result<Outcome> {
    let plugin_id = invocation.plugin_id();
    let Some(llm) = invocation.runner.llm.clone() else {
        return Err(EngineError::missing(plugin_id, "llm"));
    };

    let system_prompt = invocation.template().resolve(&system_prompt(invocation, config).await?);
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| invocation.runner.config.default_model.clone());
    let history = &invocation.runner.history;
    let prior = if config.conversational {
        history.read(plugin_id).await
    } else {
        Vec::new()
    };
    let input = invocation.matched.input.clone();

    // -- Tool loop ----------------------------------------------------------
    if !config.tools.is_empty() {
        let toolbox = Toolbox::new(invocation, &config.tools).await?;
        let agent_config = AgentConfig {
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            ..AgentConfig::default()
        };
        let adapters: Vec<Arc<dyn ToolAdapter>> = vec![Arc::new(toolbox)];
        let mut ctx = AgentContext::new(llm, adapters, agent_config)
            .with_system_prompt(system_prompt)
            .with_history(prior)
            .with_user_message(input.clone());

        let response = run_tool_loop(&mut ctx).await?;
        info!(
            rounds = response.rounds_used,
            limit_reached = response.limit_reached,
            "tool loop complete"
        );
        if config.conversational {
            history.append(plugin_id, Message::user(input)).await;
            history
                .append(plugin_id, Message::assistant(&response.text))
                .await;
        }
        return Ok(Outcome::Complete(RunResult::plain(response.text)));
    }

    // -- Plain chat ---------------------------------------------------------
    let mut messages = Vec::with_capacity(prior.len() + 2);
    messages.push(Message::system(system_prompt));
    messages.extend(prior);
    messages.push(Message::user(&input));
    let request = ChatRequest {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        ..ChatRequest::new(model, messages)
    };

    if config.is_streaming() {
        debug!(conversational = config.conversational, "opening chat stream");
        let stream = llm.stream(&request).await?;
        if !config.conversational {
            return Ok(Outcome::Stream(stream));
        }

        history.append(plugin_id, Message::user(input)).await;
        let history = history.clone();
        let key = plugin_id.to_string();
        let stream = stream.on_complete(move |text| async move {
            history.append(&key, Message::assistant(text)).await;
        });
        return Ok(Outcome::Stream(stream));
    }

    match llm.chat(&request).await? {
        LlmResponse::Text(text) => Ok(Outcome::Complete(RunResult::plain(text))),
        LlmResponse::ToolCalls(calls) => Err(EngineError::InvalidResponse {
            reason: format!(
                "model requested {} tool call(s) but the plugin declares no tools",
                calls.len()
            ),
        }),
    }
}

/// The prompt text from the manifest or its prompt file, before templating.
async fn system_prompt(invocation: &Invocation<'_>, config: &AiConfig) -> Result<String> {
    if let Some(prompt) = &config.system_prompt {
        return Ok(prompt.clone());
    }
    match &config.system_prompt_file {
        Some(file) => Ok(tokio::fs::read_to_string(invocation.manifest().dir.join(file)).await?),
        None => Err(EngineError::missing(invocation.plugin_id(), "system_prompt")),
    }
}
