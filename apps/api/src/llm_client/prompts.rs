// Cross-cutting prompt fragments shared by every structured inference call.
// Stage-specific prompts live alongside the stage (see enrichment::prompts).

/// Appended to every system prompt: the reply is parsed as a single JSON object.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Heading placed before the output schema in every rendered prompt.
pub const OUTPUT_SCHEMA_HEADING: &str =
    "Return a JSON object with EXACTLY these fields (no extra fields):";
