//! Prompt templates
//!
//! Deterministic assembly of system instructions, fixed few-shot examples
//! and task input for each agent. No state, no I/O.

use crate::models::RetrievedChunk;

const ROUTING_SYSTEM: &str = r#"You are a query classifier for an Islamic finance assistant.

Classify the user's question into exactly one category:
- principles: core concepts and prohibitions (Riba, Gharar, Maysir, Shariah foundations)
- products: specific Islamic financial products (Murabaha, Ijarah, Sukuk, Takaful, Musharakah, Mudharabah)
- compliance: whether an activity, investment or contract is Shariah compliant
- comparison: Islamic versus conventional finance, or product against product
- calculation: numeric profit/loss distribution for Musharakah or Mudharabah contracts
- general: anything else related to Islamic finance

Respond with a single line in the format:
category|confidence|explanation

confidence is a number between 0 and 1. Do not add any other text."#;

const ROUTING_EXAMPLES: &[(&str, &str)] = &[
    (
        "What is Riba?",
        "principles|0.95|Asks for the definition of a core prohibition",
    ),
    (
        "How does a Murabaha home financing work?",
        "products|0.92|Asks about the mechanics of a specific product",
    ),
    (
        "Is investing in tobacco companies halal?",
        "compliance|0.9|Asks whether an investment is permissible",
    ),
    (
        "What is the difference between Sukuk and conventional bonds?",
        "comparison|0.93|Contrasts an Islamic instrument with a conventional one",
    ),
    (
        "Partner A invests $60,000 and partner B $40,000, profit is $20,000. How is it split?",
        "calculation|0.96|Requests a numeric Musharakah profit distribution",
    ),
    (
        "Where can I learn more about Islamic banking?",
        "general|0.8|General request for learning resources",
    ),
];

const KNOWLEDGE_SYSTEM: &str = r#"You are a knowledgeable Islamic finance advisor.

Guidelines:
- Answer using ONLY the provided sources
- Cite sources inline as [Source N]
- If the sources do not fully answer the question, say what is missing
- Use respectful, accurate Islamic finance terminology
- Never promote interest-based products"#;

const GENERAL_SYSTEM: &str = r#"You are a knowledgeable Islamic finance advisor.

No reference documents matched this question. Answer from general Islamic
finance knowledge, state that no specific sources were found, keep the answer
concise, and never promote interest-based products."#;

const EXTRACTION_SYSTEM: &str = r#"You extract structured parameters for Islamic finance profit/loss calculations.

Supported contract types:
- musharakah: partnership where every partner contributes capital
  parameters: {"partners": [{"name": string, "investment": number}], "profit": number, "profitRatios": [number] (optional, must sum to 1)}
- mudharabah: one capital provider and one entrepreneur
  parameters: {"capital": number, "profit": number, "capitalProviderRatio": number, "entrepreneurRatio": number}

Use a negative profit for a loss. Respond with strict JSON only:
{"type": "musharakah" | "mudharabah", "parameters": {...}}"#;

const EXTRACTION_EXAMPLES: &[(&str, &str)] = &[
    (
        "Ali invests $60,000 and Sara invests $40,000 in a Musharakah. The profit is $20,000.",
        r#"{"type":"musharakah","parameters":{"partners":[{"name":"Ali","investment":60000},{"name":"Sara","investment":40000}],"profit":20000}}"#,
    ),
    (
        "A bank provides $100,000 to an entrepreneur under Mudharabah with a 60/40 profit split. The business lost $20,000.",
        r#"{"type":"mudharabah","parameters":{"capital":100000,"profit":-20000,"capitalProviderRatio":0.6,"entrepreneurRatio":0.4}}"#,
    ),
];

const COMPLIANCE_SYSTEM: &str = r#"You are a Shariah compliance reviewer for an Islamic finance assistant.

Review the response below against these rules:
1. No Riba: it must not promote or endorse interest-based products or returns
2. No excessive Gharar: it must not encourage contracts with excessive uncertainty
3. No prohibited industries: it must not endorse alcohol, gambling, pork, tobacco, weapons or adult entertainment
4. Respectful terminology: Islamic concepts and scholars are referred to respectfully
5. Accuracy: Islamic finance concepts are described correctly

Respond with a single line in the format:
status|confidence|reasoning|violations|suggestions

status is COMPLIANT or FLAGGED. confidence is a number between 0 and 1.
violations and suggestions are comma-separated lists, or NONE."#;

const COMPLIANCE_EXAMPLES: &[(&str, &str)] = &[
    (
        "Riba refers to any predetermined excess on a loan and is prohibited in Islamic finance.",
        "COMPLIANT|0.95|Accurately describes the prohibition of Riba|NONE|NONE",
    ),
    (
        "A conventional savings account paying 5% interest is a great halal option.",
        "FLAGGED|0.93|Promotes an interest-bearing product as permissible|Riba promotion|Recommend a Mudharabah savings account instead,Explain the prohibition of interest",
    ),
];

/// Builds the prompt for each agent call
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn routing(query: &str) -> String {
        let mut prompt = String::with_capacity(2048);
        prompt.push_str(ROUTING_SYSTEM);
        prompt.push_str("\n\nExamples:\n");
        push_examples(&mut prompt, ROUTING_EXAMPLES, "Question", "Answer");
        prompt.push_str(&format!("\nQuestion: {}\nAnswer:", query.trim()));
        prompt
    }

    /// Grounded answer prompt; context blocks are `[Source i]\n<content>`.
    pub fn knowledge(query: &str, sources: &[RetrievedChunk]) -> String {
        format!(
            "{}\n\nSources:\n{}\n\nQuestion: {}\n\nAnswer:",
            KNOWLEDGE_SYSTEM,
            Self::source_context(sources),
            query.trim()
        )
    }

    /// Ungrounded fallback used when retrieval found nothing.
    pub fn general_knowledge(query: &str) -> String {
        format!("{}\n\nQuestion: {}\n\nAnswer:", GENERAL_SYSTEM, query.trim())
    }

    pub fn extraction(query: &str) -> String {
        let mut prompt = String::with_capacity(2048);
        prompt.push_str(EXTRACTION_SYSTEM);
        prompt.push_str("\n\nExamples:\n");
        push_examples(&mut prompt, EXTRACTION_EXAMPLES, "Text", "JSON");
        prompt.push_str(&format!("\nText: {}\nJSON:", query.trim()));
        prompt
    }

    pub fn compliance(response_text: &str) -> String {
        let mut prompt = String::with_capacity(2048 + response_text.len());
        prompt.push_str(COMPLIANCE_SYSTEM);
        prompt.push_str("\n\nExamples:\n");
        push_examples(&mut prompt, COMPLIANCE_EXAMPLES, "Response", "Review");
        prompt.push_str(&format!("\nResponse: {}\nReview:", response_text.trim()));
        prompt
    }

    pub fn source_context(sources: &[RetrievedChunk]) -> String {
        sources
            .iter()
            .enumerate()
            .map(|(i, chunk)| format!("[Source {}]\n{}", i + 1, chunk.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn push_examples(prompt: &mut String, examples: &[(&str, &str)], input: &str, output: &str) {
    for (question, answer) in examples {
        prompt.push_str(&format!("{}: {}\n{}: {}\n\n", input, question, output, answer));
    }
}
