//! The single C1 `CompleteStructured` prompt driving §4.4 step 2.

const EXTRACTION_INSTRUCTIONS: &str = "Extract named entities and the relationships between them \
from the text below. Respond with JSON matching exactly this shape: \
{\"entities\": [{\"name\": string, \"type\": string, \"description\": string}], \
\"relationships\": [{\"source_name\": string, \"target_name\": string, \"description\": string, \
\"rank\": number}]}. Entity `type` is a short, stable, upper-case label (e.g. PERSON, ORG, \
LOCATION, FACT). `rank` reflects relationship strength/confidence from 0 (weak) to 10 (certain). \
Every `source_name`/`target_name` must match an entity's `name` exactly. Respond with JSON only, \
no surrounding prose.";

pub fn extraction_prompt(unit_text: &str) -> String {
    format!("{EXTRACTION_INSTRUCTIONS}\n\n---\n\n{unit_text}")
}
