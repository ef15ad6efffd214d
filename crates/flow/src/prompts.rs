//! Prompts used by the planning flow. Filled with
//! [`stepwise_agent::prompts::render`].

pub const PLANNING_SYSTEM_PROMPT: &str =
    "You are a planning assistant, who is good at creating a concise, actionable plan with clear steps.";

pub const PLANNING_USER_PROMPT: &str = "\
Create a reasonable plan with clear steps to accomplish the task: {request}

### Available executors
{executors}

Requirements:
- Break the task down into multiple independent steps that together achieve the final goal.
- Each step must name its executor from 'Available executors' at the end, e.g. \"Gather relevant materials [FLOW]\".
- Write the steps in the same language as the task.";

pub const FINALIZE_PROMPT: &str = "\
You are a planning assistant. Summarize the completed plan fluently and concisely, without unrelated text. \
You can refer to the files in {workspace} to summarize.
Here is the final plan status:
{plan_text}";
