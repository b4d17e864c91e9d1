use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A full advisor profile, as exchanged with the admin endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Advisor {
    #[schema(example = "alex")]
    pub id: String,
    #[schema(example = "Alex Hormozi")]
    pub name: String,
    pub description: String,
    pub personality: String,
}

impl Advisor {
    pub fn summary(&self) -> AdvisorSummary {
        AdvisorSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// The public view of an advisor, without the personality prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdvisorSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update for an advisor. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AdvisorPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,
}

impl AdvisorPatch {
    pub fn apply(self, advisor: &mut Advisor) {
        if let Some(name) = self.name {
            advisor.name = name;
        }
        if let Some(description) = self.description {
            advisor.description = description;
        }
        if let Some(personality) = self.personality {
            advisor.personality = personality;
        }
    }
}

/// Finds an advisor's display name in a roster, matching the id case-insensitively.
pub fn display_name<'a>(roster: &'a [AdvisorSummary], advisor_id: &str) -> Option<&'a str> {
    roster
        .iter()
        .find(|a| a.id.eq_ignore_ascii_case(advisor_id))
        .map(|a| a.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alex() -> Advisor {
        Advisor {
            id: "alex".into(),
            name: "Alex Hormozi".into(),
            description: "Offers and growth".into(),
            personality: "Blunt.".into(),
        }
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let mut advisor = alex();
        AdvisorPatch {
            description: Some("Scaling".into()),
            ..Default::default()
        }
        .apply(&mut advisor);

        assert_eq!(advisor.name, "Alex Hormozi");
        assert_eq!(advisor.description, "Scaling");
        assert_eq!(advisor.personality, "Blunt.");
    }

    #[test]
    fn patch_serializes_without_absent_fields() {
        let patch = AdvisorPatch {
            name: Some("Alex".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"name":"Alex"}"#);
    }

    #[test]
    fn display_name_is_case_insensitive() {
        let roster = vec![alex().summary()];
        assert_eq!(display_name(&roster, "Alex"), Some("Alex Hormozi"));
        assert_eq!(display_name(&roster, "mark"), None);
    }

    #[test]
    fn summary_without_description_deserializes() {
        let summary: AdvisorSummary =
            serde_json::from_str(r#"{"id":"mark","name":"Mark Cuban"}"#).unwrap();
        assert_eq!(summary.description, "");
    }
}
