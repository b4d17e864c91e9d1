//! The in-memory advisor roster.

use advisory_core::{Advisor, AdvisorPatch, AdvisorSummary};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("Advisor '{0}' not found")]
    NotFound(String),
    #[error("Advisor '{0}' already exists")]
    Duplicate(String),
}

/// Advisors in creation order.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    advisors: Vec<Advisor>,
}

impl Roster {
    pub fn new(advisors: Vec<Advisor>) -> Self {
        Self { advisors }
    }

    /// The six advisors every fresh sandbox starts with.
    pub fn seeded() -> Self {
        let seed = |id: &str, name: &str, description: &str, focus: &str| Advisor {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            personality: format!("You are {name}. {focus}"),
        };
        Self::new(vec![
            seed(
                "alex",
                "Alex Hormozi",
                "Business scaling expert focused on offers and growth",
                "You obsess over offers, pricing and the value equation.",
            ),
            seed(
                "tony",
                "Tony Robbins",
                "Peak performance coach and strategic advisor",
                "You push for clarity, state management and massive action.",
            ),
            seed(
                "mark",
                "Mark Cuban",
                "Entrepreneur, investor, and business strategist",
                "You are blunt about sales, margins and knowing your numbers.",
            ),
            seed(
                "sara",
                "Sara Blakely",
                "Entrepreneur and founder of Spanx",
                "You champion scrappy testing, bootstrapping and embracing failure.",
            ),
            seed(
                "seth",
                "Seth Godin",
                "Marketing expert and author",
                "You talk about the smallest viable audience and being remarkable.",
            ),
            seed(
                "robert",
                "Robert Kiyosaki",
                "Real estate investor and financial educator",
                "You steer every question toward assets, cash flow and financial literacy.",
            ),
        ])
    }

    pub fn len(&self) -> usize {
        self.advisors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advisors.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.advisors.iter().map(|a| a.id.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Result<&Advisor, RosterError> {
        self.advisors
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| RosterError::NotFound(id.to_string()))
    }

    pub fn list(&self) -> &[Advisor] {
        &self.advisors
    }

    pub fn summaries(&self) -> Vec<AdvisorSummary> {
        self.advisors.iter().map(Advisor::summary).collect()
    }

    pub fn create(&mut self, advisor: Advisor) -> Result<(), RosterError> {
        if self.get(&advisor.id).is_ok() {
            return Err(RosterError::Duplicate(advisor.id));
        }
        self.advisors.push(advisor);
        Ok(())
    }

    pub fn update(&mut self, id: &str, patch: AdvisorPatch) -> Result<(), RosterError> {
        let advisor = self
            .advisors
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| RosterError::NotFound(id.to_string()))?;
        patch.apply(advisor);
        Ok(())
    }

    pub fn delete(&mut self, id: &str) -> Result<Advisor, RosterError> {
        let index = self
            .advisors
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| RosterError::NotFound(id.to_string()))?;
        Ok(self.advisors.remove(index))
    }
}
