/// RAG prompt assembly

use crate::retrieval::Record;

const INSTRUCTION_SUFFIX: &str = "Based on the user query and the listings above, answer the user's question about available rentals. \
If specific listings match their criteria, mention the details. If nothing matches exactly, suggest the closest alternatives.

Answer:";

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub text: String,
    /// Length of the serialized record context, in characters.
    pub context_chars: usize,
    pub record_count: usize,
}

/// Serialize one record; field order is fixed.
pub fn render_record(record: &Record) -> String {
    format!(
        "ID: {}\nType: {}\nBedrooms: {}\nBathrooms: {}\nLocation: {}\nWeekly Rent: ${}\nFeatures: {}\nDescription: {}",
        record.id,
        record.kind,
        record.bedrooms,
        record.bathrooms,
        record.location,
        record.price,
        record.features.join(", "),
        record.description,
    )
}

pub fn build_prompt(query: &str, records: &[Record]) -> BuiltPrompt {
    let context = records
        .iter()
        .map(render_record)
        .collect::<Vec<_>>()
        .join("\n\n");

    let text = format!(
        "User Query: {}\n\nCONTEXT INFORMATION:\n{}\n\n{}",
        query, context, INSTRUCTION_SUFFIX
    );

    BuiltPrompt {
        text,
        context_chars: context.chars().count(),
        record_count: records.len(),
    }
}
