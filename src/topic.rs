/// Terms that mark a question as being about the audit reports.
pub const TOPIC_KEYWORDS: [&str; 14] = [
    "informe",
    "control",
    "contraloría",
    "sección",
    "section",
    "relativo",
    "auditoría",
    "documento",
    "relative_path",
    "section_id",
    "observación",
    "hallazgo",
    "recomendación",
    "entidad",
];

/// `true` when the lower-cased question contains none of the keywords.
pub fn is_out_of_scope(question: &str) -> bool {
    let question_lc = question.to_lowercase();
    !TOPIC_KEYWORDS.iter().any(|keyword| question_lc.contains(keyword))
}
