//! Built-in prompt templates.
//!
//! Both candidate calls share [`ANSWER_TEMPLATE`] verbatim; only the
//! sampling temperature differs between them. [`MERGE_TEMPLATE`] receives
//! the surviving candidates plus the full context list and defines the
//! trailer contract the output parser relies on.

/// Template for the candidate answer calls.
pub const ANSWER_TEMPLATE: &str = "\
You are a due diligence analyst answering questionnaire questions based on provided documents.

CONTEXT FROM DOCUMENTS:
{{#each context}}
[{{key}}] {{doc_name}}, page {{page}}:
{{text}}

---

{{/each}}
QUESTION: {{question}}

INSTRUCTIONS:
1. Answer the question based ONLY on the provided context.
2. Cite every factual claim by placing the bracketed source key after it, exactly as written above, e.g. [{{first_key}}].
3. If the context does not contain enough information, say INSUFFICIENT_DATA and explain what is missing.
4. Be concise but thorough.

ANSWER:";

/// Template for the merge call.
pub const MERGE_TEMPLATE: &str = "\
You are reviewing draft answers to the same due diligence question and must produce one final answer.

QUESTION: {{question}}

{{#each candidates}}
DRAFT ANSWER {{label}}:
{{text}}

{{/each}}
CONTEXT FROM DOCUMENTS:
{{#each context}}
[{{key}}] {{doc_name}}, page {{page}}:
{{text}}

---

{{/each}}
INSTRUCTIONS:
1. Produce one consolidated answer. Prefer claims supported by more than one draft; where drafts conflict, keep the more specific or better-cited claim.
2. Cite with the bracketed source keys exactly as written in the context above. Never invent a key.
3. Cite each source at most once per claim; do not repeat a citation for the same source with different wording.
4. After the answer, finish with exactly these two lines:
ANSWERABLE: yes, partial, or no
CONFIDENCE: a number between 0.0 and 1.0 reflecting how well the context supports the answer

FINAL ANSWER:";
