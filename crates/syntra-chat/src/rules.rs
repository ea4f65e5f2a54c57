//! Ordered keyword rules. The first rule with a matching phrase answers;
//! nothing after it is consulted.

use syntra_types::models::{ChatAction, ChatMessage, Role};

pub struct Rule {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    respond: fn(Role) -> ChatMessage,
}

impl Rule {
    pub fn respond(&self, role: Role) -> ChatMessage {
        (self.respond)(role)
    }

    /// True when any keyword occurs anywhere in `normalized`, so inflected
    /// forms ("reportarlo") still reach their rule.
    pub fn matches(&self, normalized: &str) -> bool {
        self.keywords.iter().any(|k| {
            if WHOLE_WORD_KEYWORDS.contains(k) {
                normalized
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| word == *k)
            } else {
                normalized.contains(k)
            }
        })
    }
}

/// Keywords too short to match inside other words: "hi" would otherwise
/// turn every "historial" into a greeting.
const WHOLE_WORD_KEYWORDS: &[&str] = &["hi"];

/// Lower-case and trim, the form both matching and history use.
pub fn normalize(input: &str) -> String {
    input.trim().to_lowercase()
}

/// First matching rule in table order.
pub fn match_rule(normalized: &str) -> Option<&'static Rule> {
    RULES.iter().find(|rule| rule.matches(normalized))
}

fn route(screen: &str, role: Role, query: &str) -> String {
    format!("{}/{}?{}", screen, role.route_segment(), query)
}

pub static RULES: &[Rule] = &[
    Rule {
        name: "greeting",
        keywords: &[
            "hola", "buenas", "buenos dias", "buenas tardes", "buenas noches", "hey", "holi",
            "holaaa", "que tal", "saludo", "saludos", "hi", "hello", "alo", "qué más", "q mas",
            "buen dia",
        ],
        respond: greeting,
    },
    Rule {
        name: "thanks",
        keywords: &[
            "gracias", "muchas gracias", "mil gracias", "ok", "listo", "perfecto", "entendido",
            "dale", "vale", "genial", "super", "bien", "de acuerdo",
        ],
        respond: thanks,
    },
    Rule {
        name: "create_report",
        keywords: &[
            "hacer un reporte", "crear reporte", "crear un reporte", "reportar", "nueva falla",
            "reporte nuevo", "quiero hacer un reporte", "necesito reportar",
            "como hago un reporte", "cómo hago un reporte", "como reportar", "cómo reportar",
            "reportar semaforo", "reportar semáforo", "crear incidencia", "agregar reporte",
            "reportar una falla", "levantar reporte", "registrar reporte", "cargar un reporte",
            "abrir reporte", "diligenciar reporte", "denunciar semaforo", "denunciar semáforo",
            "iniciar reporte", "generar reporte", "hacer reporte de semaforo",
            "hacer reporte de semáforo", "nuevo reporte de falla", "quiero reportar una falla",
            "necesito crear un reporte", "donde reporto", "dónde reporto",
        ],
        respond: create_report,
    },
    Rule {
        name: "history",
        keywords: &[
            "ver mis reportes", "mis reportes", "historial", "ver historial", "consultar reportes",
            "ver antiguos reportes", "revisar mis reportes", "mis incidencias", "revisar historial",
            "historial de reportes", "mis registros", "ver mis incidencias", "consultar historial",
            "abrir historial", "listar mis reportes", "lista de reportes", "donde veo mis reportes",
            "donde ver mis reportes", "dónde veo mis reportes", "dónde ver mis reportes",
            "ver reportes anteriores", "ver reportes pasados", "ver lo que reporte",
            "lo que reporté", "mis casos", "reportes que hice", "consultar mis casos",
            "reporte realizado", "historial personal", "historial propio", "abrir mis reportes",
            "ver mis tickets",
        ],
        respond: history,
    },
    Rule {
        name: "map",
        keywords: &[
            "mapa", "ver mapa", "abrir mapa", "ver ubicacion", "ver ubicación", "mostrar mapa",
            "ubicar", "ver punto", "ver marcadores", "ver reportes en mapa", "mapa de reportes",
            "mapa interactivo", "abrir el mapa", "abrir el mapa de reportes", "donde esta",
            "dónde está", "ver en el mapa", "ver ubicaciones", "mostrar ubicaciones", "mapita",
            "map", "map view", "map screen", "localizar", "localizacion", "localización",
            "ver coordenadas", "coordenadas", "ver sitio", "abrir geografia", "abrir geografía",
        ],
        respond: map,
    },
    Rule {
        name: "feedback",
        keywords: &[
            "feedback", "dejar feedback", "sugerencia", "sugerencias", "comentario",
            "comentarios", "quiero opinar", "opinion", "opinión", "dar feedback",
            "dejar comentario", "dejar sugerencia", "dar sugerencia", "enviar feedback",
            "enviar comentario", "escribir feedback", "escribir comentario", "retroalimentacion",
            "retroalimentación", "caja de sugerencias", "buzon", "buzón", "feedback usuario",
            "opiniones", "quiero sugerir", "recomendacion", "recomendación", "sugerir", "queja",
            "reclamo",
        ],
        respond: feedback,
    },
    Rule {
        name: "statistics",
        keywords: &[
            "estadisticas", "estadísticas", "ver estadísticas", "ver estadisticas", "datos",
            "resumen", "panel", "panel de datos", "metricas", "métricas", "analitica",
            "analítica", "graficos", "gráficos", "kpis", "indicadores", "reportes agregados",
            "estadistica general", "estadística general", "informe", "informe actual",
            "datos actualizados", "consolidado", "tablero", "dashboard", "panel estadistico",
            "panel estadístico", "ver cifras", "ver datos", "resumen de reportes",
        ],
        respond: statistics,
    },
    Rule {
        name: "profile",
        keywords: &[
            "perfil", "mi cuenta", "cerrar sesión", "datos personales", "datos de usuarios",
            "datos de usuario", "configuración", "configuracion", "mi perfil", "editar perfil",
            "cambiar mi nombre",
        ],
        respond: profile,
    },
    Rule {
        name: "guided_help",
        keywords: &["primera vez", "cómo usar", "ayuda", "tutorial", "no sé usar"],
        respond: guided_help,
    },
];

fn greeting(_role: Role) -> ChatMessage {
    ChatMessage::bot("¡Hola! ¿Cómo puedo ayudarte hoy? 😊")
}

fn thanks(_role: Role) -> ChatMessage {
    ChatMessage::bot("¡Con gusto! Si necesitas más ayuda, solo escríbeme.")
}

fn create_report(role: Role) -> ChatMessage {
    ChatMessage::bot(
        "📋 **Paso a paso para crear un reporte en Syntra:**\n\
         \n\
         1️⃣ Pulsa **\"Crear reporte\"** para abrir la pantalla de reportes.\n\
         2️⃣ Toca la barra de **ubicación** y selecciona el punto exacto en el mapa.\n\
         3️⃣ Elige el **estado** (Operativo / Inspección / Falla crítica).\n\
         4️⃣ Describe la falla y, si puedes, **adjunta una foto**.\n\
         5️⃣ Toca **\"Reportar\"** para enviarlo.\n\
         \n\
         Si luego quieres consultar tus reportes pasados, abre el **Historial**.",
    )
    .with_actions(vec![
        ChatAction::new(
            "📍 Reportar falla",
            route("report_screen", role, "fromMenu=false&fromMap=false&fromChatbot=true"),
        ),
        ChatAction::new(
            "🕓 Ver historial",
            route("history_screen", role, "fromMenu=false&fromMap=false&fromChatbot=true"),
        ),
    ])
}

fn history(role: Role) -> ChatMessage {
    ChatMessage::bot("Aquí puedes consultar todos tus reportes registrados. 🕓").with_actions(vec![
        ChatAction::new(
            "🕓 Abrir historial",
            route("history_screen", role, "fromMenu=false&fromMap=false&fromChatbot=true"),
        ),
    ])
}

fn map(role: Role) -> ChatMessage {
    ChatMessage::bot("Abre el mapa interactivo para ver reportes por ubicación. 🌍").with_actions(vec![
        ChatAction::new(
            "🗺️ Abrir mapa",
            route("mapa_screen", role, "fromMenu=false&fromChatbot=true"),
        ),
    ])
}

fn feedback(role: Role) -> ChatMessage {
    match role {
        Role::Citizen => ChatMessage::bot(
            "Puedes dejar un comentario o sugerencia en la sección de feedback. 💬",
        )
        .with_actions(vec![ChatAction::new(
            "📝 Abrir feedback",
            "feedback_screen/usuario?fromMenu=false&fromChatbot=true",
        )]),
        Role::Agent => {
            ChatMessage::bot("El módulo de feedback está reservado para los ciudadanos. 🚫")
        }
    }
}

fn statistics(role: Role) -> ChatMessage {
    match role {
        Role::Citizen => ChatMessage::bot(
            "Las estadísticas están disponibles solo para el personal de tránsito. 🚫",
        ),
        Role::Agent => ChatMessage::bot(
            "Accede al panel de estadísticas para ver los datos más recientes. 📊",
        )
        .with_actions(vec![ChatAction::new(
            "📈 Ver estadísticas",
            "estadisticas_screen/agente?fromChatbot=true",
        )]),
    }
}

fn profile(role: Role) -> ChatMessage {
    let destination = match role {
        Role::Citizen => "profile_user?fromMenu=false&fromChatbot=true",
        Role::Agent => "profile_transito?fromMenu=false&fromChatbot=true",
    };
    ChatMessage::bot("👤 Desde tu perfil puedes revisar tus datos o cerrar sesión.")
        .with_actions(vec![ChatAction::new("👤 Ir al perfil", destination)])
}

fn guided_help(role: Role) -> ChatMessage {
    ChatMessage::bot(
        "💡 Bienvenido a Syntra.\n\
         Te explico rápidamente cómo moverte en la app:\n\
         - Usa **Reportar falla** para informar un semáforo dañado.\n\
         - **Mapa** te muestra los puntos activos.\n\
         - En **Historial** puedes ver tus reportes previos.\n\
         - Y en **Feedback** puedes dejar tus sugerencias.\n\
         \n\
         ¿Por cuál te gustaría empezar?",
    )
    .with_actions(vec![
        ChatAction::new(
            "📍 Crear reporte",
            route("report_screen", role, "fromMenu=true&fromChatbot=true"),
        ),
        ChatAction::new(
            "🗺️ Ver mapa",
            route("mapa_screen", role, "fromMenu=true&fromChatbot=true"),
        ),
        ChatAction::new(
            "🕓 Ver historial",
            route("history_screen", role, "fromMenu=true&fromChatbot=true"),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_for(input: &str) -> Option<&'static str> {
        match_rule(&normalize(input)).map(|r| r.name)
    }

    #[test]
    fn report_request_gets_instructions_and_two_actions() {
        let rule = match_rule(&normalize("quiero hacer un reporte")).unwrap();
        assert_eq!(rule.name, "create_report");

        let reply = rule.respond(Role::Citizen);
        assert!(reply.text.contains("Paso a paso"));
        let labels: Vec<&str> = reply.actions.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["📍 Reportar falla", "🕓 Ver historial"]);
        assert!(reply.actions[0].destination.starts_with("report_screen/usuario?"));
    }

    #[test]
    fn first_match_wins() {
        // "hola" is a greeting even though "reportar" is also present
        assert_eq!(rule_for("Hola, quiero reportar"), Some("greeting"));
        // "datos" belongs to statistics, which precedes profile
        assert_eq!(rule_for("datos personales"), Some("statistics"));
    }

    #[test]
    fn inflected_forms_reach_their_rule() {
        assert_eq!(rule_for("necesito reportarlo ya"), Some("create_report"));
        assert_eq!(rule_for("quiero reportarla"), Some("create_report"));
        assert_eq!(rule_for("  MAPA  "), Some("map"));
        // substring containment, as in "mapas"
        assert_eq!(rule_for("los mapas"), Some("map"));
    }

    #[test]
    fn hi_only_greets_as_a_whole_word() {
        assert_eq!(rule_for("ver historial"), Some("history"));
        assert_eq!(rule_for("hi"), Some("greeting"));
        assert_eq!(rule_for("hi, necesito ayuda"), Some("greeting"));
    }

    #[test]
    fn dispatch_is_deterministic() {
        for input in ["mis reportes", "dashboard", "tutorial", "cuál es el clima"] {
            let first = rule_for(input);
            for _ in 0..5 {
                assert_eq!(rule_for(input), first);
            }
        }
    }

    #[test]
    fn role_gated_rules() {
        let stats = match_rule("estadisticas").unwrap();
        assert!(stats.respond(Role::Citizen).actions.is_empty());
        assert_eq!(stats.respond(Role::Agent).actions.len(), 1);

        let feedback = match_rule("sugerencia").unwrap();
        assert_eq!(feedback.respond(Role::Citizen).actions.len(), 1);
        assert!(feedback.respond(Role::Agent).text.contains("reservado"));
    }

    #[test]
    fn profile_destination_depends_on_role() {
        let rule = match_rule("mi perfil").unwrap();
        assert!(rule.respond(Role::Citizen).actions[0].destination.starts_with("profile_user"));
        assert!(rule.respond(Role::Agent).actions[0].destination.starts_with("profile_transito"));
    }

    #[test]
    fn unmatched_input_falls_through() {
        assert_eq!(rule_for("cuál es el clima en bogotá"), None);
    }
}
