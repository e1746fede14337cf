use crate::datam::Message;
use crate::error::RagError;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static SLOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").expect("slot regex is valid"));

// --- Hardcoded Prompts ---

pub const PROMPT_MAIN: &str = r#"
[INST]
Usted es un asistente de inteligencia artificial diseñado para responder preguntas utilizando capacidades de recuperación aumentada por contexto (RAG). Cuando se le formule una pregunta, se le proporcionará también un contexto entre las etiquetas <context> y </context>, y el historial de la conversación entre <chat_history> y </chat_history>. Utilice la información proporcionada en el contexto y el historial para entregar una respuesta clara, concisa, directamente relevante y en lenguaje formal.

El contexto recuperado corresponde a informes de control elaborados por la Contraloría General de la República del Perú (CGR) sobre funcionarios públicos o entidades estatales, a partir de indicios de posibles delitos de distinto tipo. Cada informe concluye si esos indicios ameritan acciones correctivas o penales, una investigación más profunda o solo recomendaciones a la persona o entidad.

Los indicios pueden provenir de investigaciones de oficio realizadas por la CGR o de denuncias recibidas de ciudadanos, anónimas o no.

Al responder, cite siempre el documento y la sección de donde extrajo la información relevante.

Si la pregunta no se puede responder con el contexto ni el historial proporcionados, indique: "No dispongo de información suficiente para responder a esa pregunta."

No utilice frases como "según el contexto proporcionado" ni haga referencia al sistema.

<chat_history>
{chat_history}
</chat_history>
<context>
{prompt_context}
</context>
<question>
{user_question}
</question>
[/INST]
Respuesta:

Advertencia: Esta respuesta es generada automáticamente y no constituye una interpretación legal oficial.
"#;

pub const PROMPT_SUMMARY: &str = r#"
[INST]
Con base en el siguiente historial de la conversación y la pregunta actual, genere una versión ampliada de la pregunta que integre el contexto relevante del historial. Responda únicamente con la pregunta ampliada en lenguaje formal, sin añadir explicaciones.

<chat_history>
{chat_history}
</chat_history>
<question>
{question}
</question>
[/INST]
"#;

pub const OUT_OF_SCOPE_MSG: &str = "Lo siento, solo puedo responder preguntas relacionadas con informes de control.
Por favor, formule una consulta referida a un informe o sección específica.

Advertencia: Esta respuesta es generada automáticamente y no constituye una interpretación legal oficial.
";

/// Replaces each `{slot}` of `template` with its value in a single pass.
///
/// Values are inserted verbatim and never scanned for placeholders
/// themselves. Every provided slot must occur in the template; unknown
/// placeholders are left as they are.
pub fn fill_template(template: &str, slots: &[(&str, &str)]) -> Result<String, RagError> {
    for (name, _) in slots {
        let placeholder = format!("{{{}}}", name);
        if !template.contains(&placeholder) {
            return Err(RagError::ConfigError(format!(
                "Template has no '{}' slot",
                placeholder
            )));
        }
    }

    let rendered = SLOT_RE.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match slots.iter().find(|(slot, _)| *slot == name) {
            Some((_, value)) => value.to_string(),
            None => caps[0].to_string(),
        }
    });
    Ok(rendered.into_owned())
}

/// One `Role: content` line per message, roles capitalized.
pub fn format_chat_history(history: &[Message]) -> String {
    history
        .iter()
        .map(|msg| format!("{}: {}\n", msg.role.label(), msg.content))
        .collect()
}

pub fn render_main_prompt(
        chat_history: &str,
        prompt_context: &str,
        user_question: &str,
    ) -> Result<String, RagError> {
    fill_template(
        PROMPT_MAIN,
        &[
            ("chat_history", chat_history),
            ("prompt_context", prompt_context),
            ("user_question", user_question),
        ],
    )
}

pub fn render_summary_prompt(chat_history: &str, question: &str) -> Result<String, RagError> {
    fill_template(
        PROMPT_SUMMARY,
        &[("chat_history", chat_history), ("question", question)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datam::{format_assistant_message, format_user_message};

    #[test]
    fn substituted_values_are_not_rescanned() {
        let rendered = fill_template("<q>{question}</q>", &[("question", "¿qué dice {question}?")]).unwrap();
        assert_eq!(rendered, "<q>¿qué dice {question}?</q>");
    }

    #[test]
    fn unknown_slot_is_rejected() {
        let err = fill_template("<q>{question}</q>", &[("pregunta", "x")]).unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn main_prompt_holds_every_part() {
        let prompt = render_main_prompt("User: hola\n", "Documento: A, Sección: 1\nx\n\n", "¿Qué dice el informe?").unwrap();
        assert!(prompt.contains("<chat_history>\nUser: hola\n\n</chat_history>"));
        assert!(prompt.contains("<context>\nDocumento: A, Sección: 1\nx\n\n\n</context>"));
        assert!(prompt.contains("<question>\n¿Qué dice el informe?\n</question>"));
        assert!(prompt.contains("No dispongo de información suficiente para responder a esa pregunta."));
        assert!(!prompt.contains("{user_question}"));
    }

    #[test]
    fn history_lines_use_capitalized_roles() {
        let history = vec![
            format_user_message("¿Qué es el informe 12?".to_string()),
            format_assistant_message("Un informe de control.".to_string()),
        ];
        assert_eq!(
            format_chat_history(&history),
            "User: ¿Qué es el informe 12?\nAssistant: Un informe de control.\n"
        );
        assert_eq!(format_chat_history(&[]), "");
    }
}
