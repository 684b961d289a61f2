use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

/// A seasoning with an optional free-form amount ("2g", "a pinch").
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Seasoning {
    pub name: String,
    #[serde(default)]
    pub amount: String,
}

impl Seasoning {
    pub fn new(name: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            amount: amount.into(),
        }
    }
}

impl fmt::Display for Seasoning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.amount.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} {}", self.name, self.amount)
        }
    }
}

/// Parses `name` or `name:amount`.
impl FromStr for Seasoning {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, amount) = s.split_once(':').unwrap_or((s, ""));
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("seasoning name missing in {s:?}"));
        }
        Ok(Self::new(name, amount.trim()))
    }
}

/// What the user entered: ingredients, seasonings and a cooking method.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecipeDraft {
    pub ingredients: Vec<String>,
    pub seasonings: Vec<Seasoning>,
    pub cooking_method: String,
}

impl RecipeDraft {
    /// Trims every entry, drops blank ones and checks the draft is complete.
    pub fn validate(self) -> Result<Self, AppError> {
        let ingredients: Vec<String> = self
            .ingredients
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect();
        if ingredients.is_empty() {
            return Err(AppError::Validation(
                "please enter at least one ingredient".into(),
            ));
        }
        let cooking_method = self.cooking_method.trim().to_string();
        if cooking_method.is_empty() {
            return Err(AppError::Validation("please choose a cooking method".into()));
        }
        let seasonings = self
            .seasonings
            .into_iter()
            .map(|s| Seasoning::new(s.name.trim(), s.amount.trim()))
            .filter(|s| !s.name.is_empty())
            .collect();
        Ok(Self {
            ingredients,
            seasonings,
            cooking_method,
        })
    }

    fn ingredient_list(&self) -> String {
        self.ingredients.join(", ")
    }

    fn seasoning_list(&self) -> String {
        self.seasonings
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Prompt asking a food critic for the taste profile and an overall
    /// evaluation.
    pub fn evaluation_prompt(&self) -> String {
        let seasonings = self.seasoning_list();
        let seasoning_clause = if seasonings.is_empty() {
            String::new()
        } else {
            format!(", seasoned with {seasonings}")
        };
        format!(
            "I want to cook a dish using {ingredients}{seasoning_clause}, and the cooking method is {method}.\n\
             \n\
             As a professional food critic, please analyze:\n\
             1. The taste profile this dish is likely to have (for example savory and mildly spicy, or sweet and sour)\n\
             2. An overall evaluation of the dish, covering:\n   \
             - how well the flavors pair\n   \
             - nutritional balance\n   \
             - creativity\n\
             \n\
             Start with a one-line taste summary, then answer concisely and professionally in separate paragraphs.",
            ingredients = self.ingredient_list(),
            method = self.cooking_method,
        )
    }

    /// Prompt for the dish photograph.
    pub fn image_prompt(&self) -> String {
        format!(
            "An exquisite {method} dish made with {ingredients}, elegant plating, food photography, high definition, professional lighting",
            method = self.cooking_method,
            ingredients = self.ingredient_list(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> RecipeDraft {
        RecipeDraft {
            ingredients: vec![" tomato ".into(), "".into(), "egg".into()],
            seasonings: vec![Seasoning::new("salt", "2g"), Seasoning::new("  ", "1 tsp")],
            cooking_method: " stir-fry ".into(),
        }
    }

    #[test]
    fn validate_trims_and_drops_blank_entries() {
        let draft = draft().validate().expect("valid");
        assert_eq!(draft.ingredients, vec!["tomato", "egg"]);
        assert_eq!(draft.seasonings, vec![Seasoning::new("salt", "2g")]);
        assert_eq!(draft.cooking_method, "stir-fry");
    }

    #[test]
    fn validate_requires_ingredient_and_method() {
        let no_ingredients = RecipeDraft {
            ingredients: vec!["  ".into()],
            cooking_method: "steam".into(),
            ..RecipeDraft::default()
        };
        assert!(matches!(
            no_ingredients.validate(),
            Err(AppError::Validation(msg)) if msg.contains("ingredient")
        ));

        let no_method = RecipeDraft {
            ingredients: vec!["fish".into()],
            ..RecipeDraft::default()
        };
        assert!(matches!(
            no_method.validate(),
            Err(AppError::Validation(msg)) if msg.contains("cooking method")
        ));
    }

    #[test]
    fn prompts_mention_every_part_of_the_draft() {
        let draft = draft().validate().expect("valid");
        let prompt = draft.evaluation_prompt();
        assert!(prompt.contains("tomato, egg"));
        assert!(prompt.contains("seasoned with salt 2g"));
        assert!(prompt.contains("stir-fry"));
        assert!(prompt.contains("creativity"));
        assert_eq!(
            draft.image_prompt(),
            "An exquisite stir-fry dish made with tomato, egg, elegant plating, food photography, high definition, professional lighting"
        );
    }

    #[test]
    fn seasoning_clause_is_omitted_without_seasonings() {
        let draft = RecipeDraft {
            ingredients: vec!["rice".into()],
            seasonings: Vec::new(),
            cooking_method: "steam".into(),
        };
        assert!(!draft.evaluation_prompt().contains("seasoned with"));
    }

    #[test]
    fn seasoning_parses_name_and_optional_amount() {
        assert_eq!("soy sauce:1 tbsp".parse(), Ok(Seasoning::new("soy sauce", "1 tbsp")));
        assert_eq!("pepper".parse(), Ok(Seasoning::new("pepper", "")));
        assert!(":2g".parse::<Seasoning>().is_err());
    }
}
