//! Direction-aware instruction prompt.
//!
//! The template uses chat-role markers (`<|system|>`, `<|user|>`,
//! `<|assistant|>`) and ends with the assistant turn already inside a JSON
//! code fence, so the model's first tokens are the array itself.

use crate::evidence::PromptContext;

pub fn render(ctx: &PromptContext) -> String {
    let origin = &ctx.query.origin;
    let destination = &ctx.query.destination;

    format!(
        r#"<|system|>
You are an expert Commute Guide.
The user wants to go FROM {origin} TO {destination}.

CRITICAL INSTRUCTIONS:
1. Check the "THREAD TITLE" in the street data.
2. If a thread is about the REVERSE route ({destination} to {origin}), IGNORE IT unless it explicitly mentions how to go back.
3. Only provide steps that move FROM {origin} TO {destination}.
4. If valid steps are found, verify fares against OFFICIAL DATA.
5. DO NOT invent meanings of acronyms. Leave acronyms as-is.

<|user|>
Request: {origin} to {destination}

STREET ADVICE:
{street}

OFFICIAL DATA:
{reference}

RESPONSE FORMAT (JSON ONLY):
[
  {{
    "step": 1,
    "mode": "Jeep/Bus",
    "details": "Specific instruction.",
    "fare": 13,
    "official_check": "Verification result."
  }}
]
<|assistant|>
```json
"#,
        street = ctx.street_evidence,
        reference = ctx.reference_text,
    )
}
