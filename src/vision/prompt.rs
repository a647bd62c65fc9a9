/// The two request shapes sent to the vision model: broad multi-object
/// identification for wide shots, focused single-object fine detail for
/// close-ups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptProfile {
    Survey,
    Detail,
}

impl PromptProfile {
    pub fn text(&self) -> &'static str {
        match self {
            PromptProfile::Survey => SURVEY_PROMPT,
            PromptProfile::Detail => DETAIL_PROMPT,
        }
    }

    pub fn max_tokens(&self) -> u32 {
        match self {
            PromptProfile::Survey => 4096,
            PromptProfile::Detail => 2048,
        }
    }
}

pub const SURVEY_PROMPT: &str = r#"Analyze this image of a room in a home. Identify every distinct object you can see.

For EACH object, return a JSON object with these fields:
- name: Short descriptive name (e.g., "Samsung 55-inch TV")
- description: 2-3 sentence description including color, material, brand if visible, size
- category: One of [electronics, furniture, kitchenware, books, clothing, tools, decor, appliances, sports, toys, other]
- is_book: true if this is a book, magazine, or printed material
- needs_closer_look: true if you cannot fully identify this item and a closer photo would help (partially hidden, text too small, barcode visible but unreadable)
- closer_look_reason: If needs_closer_look is true, explain why (e.g., "Book spine text is too small to read reliably")
- confidence: Float 0.0-1.0 of identification confidence
- estimated_value_usd: Rough replacement value estimate (null if uncertain)
- condition: One of [new, good, fair, poor] based on visible appearance
- bounding_box: [x1, y1, x2, y2] normalized coordinates (0-1) of object in image

Return ONLY a JSON array. Be thorough - include everything from large furniture to small items on shelves. Prefer being specific ("IKEA KALLAX shelf unit, white, 4x4") over generic ("bookshelf")."#;

pub const DETAIL_PROMPT: &str = r#"Look at this close-up image of a household item. Provide a detailed identification.

Return ONLY a JSON object with:
- name: Specific name including brand and model if visible
- description: Detailed 3-5 sentence description
- category: One of [electronics, furniture, kitchenware, books, clothing, tools, decor, appliances, sports, toys, other]
- is_book: true/false
- brand: Brand name if visible (null otherwise)
- model_number: Model or serial number if visible (null otherwise)
- visible_text: Any text, serial numbers, model numbers you can read
- barcode_present: true if a barcode or QR code is visible
- needs_closer_look: false (this IS the close-up)
- confidence: Float 0.0-1.0
- estimated_value_usd: Replacement value estimate
- condition: One of [new, good, fair, poor]
- bounding_box: [x1, y1, x2, y2] normalized coordinates (0-1) of the item"#;
