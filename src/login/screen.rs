use serde::Deserialize;
use std::{collections::HashMap, fmt};

use crate::constants::{
    ALLOW_ID, ALLOW_SELECTOR, CONFIRM_ID, COOKIE_BANNER_SELECTOR, DONT_SHOW_AGAIN_CHECKBOX_ID,
    EMAIL_ID, MFA_CHECKBOX_ID, MFA_CODE_INPUT_ID, MFA_DESCRIPTION_ID, MFA_VERIFY_ID, PWD_ID,
    SUBMIT_BUTTON_ID, SUCCESS_TEXT_PATTERNS, id_selector,
};

/// Visibility of one watched element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ElementState {
    pub visible: bool,
    pub enabled: bool,
}

/// Everything the state machine looks at, captured in one round trip
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub text: String,
    /// Watched selector -> state, `None` when the element is absent
    #[serde(default)]
    pub elements: HashMap<String, Option<ElementState>>,
}

impl PageSnapshot {
    pub fn is_visible(&self, selector: &str) -> bool {
        matches!(
            self.elements.get(selector),
            Some(Some(ElementState { visible: true, .. }))
        )
    }

    pub fn is_clickable(&self, selector: &str) -> bool {
        matches!(
            self.elements.get(selector),
            Some(Some(ElementState {
                visible: true,
                enabled: true
            }))
        )
    }

    fn shows_success(&self) -> bool {
        let text = self.text.to_lowercase();
        SUCCESS_TEXT_PATTERNS
            .iter()
            .any(|pattern| text.contains(pattern))
    }
}

/// Selectors of the allow buttons, newest page layout first
pub fn allow_selectors() -> [String; 2] {
    [ALLOW_SELECTOR.to_string(), id_selector(ALLOW_ID)]
}

/// Every selector a snapshot reports on
pub fn watched_selectors() -> Vec<String> {
    let mut selectors: Vec<String> = [
        CONFIRM_ID,
        EMAIL_ID,
        PWD_ID,
        SUBMIT_BUTTON_ID,
        MFA_DESCRIPTION_ID,
        MFA_CHECKBOX_ID,
        MFA_CODE_INPUT_ID,
        MFA_VERIFY_ID,
        DONT_SHOW_AGAIN_CHECKBOX_ID,
    ]
    .into_iter()
    .map(id_selector)
    .collect();

    selectors.extend(allow_selectors());
    selectors.push(COOKIE_BANNER_SELECTOR.to_string());
    selectors
}

/// Login page state, in detection priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Approved,
    AllowAccess,
    ConfirmCode,
    Mfa,
    StaySignedIn,
    Password,
    Email,
    /// Loading, redirecting, or a page nothing is known about
    Pending,
}

impl Screen {
    pub fn detect(snapshot: &PageSnapshot) -> Self {
        let allow_shown = allow_selectors().iter().any(|s| snapshot.is_visible(s));

        if !allow_shown && snapshot.shows_success() {
            Self::Approved
        } else if allow_selectors().iter().any(|s| snapshot.is_clickable(s)) {
            Self::AllowAccess
        } else if snapshot.is_clickable(&id_selector(CONFIRM_ID)) {
            Self::ConfirmCode
        } else if snapshot.is_visible(&id_selector(MFA_CODE_INPUT_ID))
            || snapshot.is_visible(&id_selector(MFA_DESCRIPTION_ID))
        {
            Self::Mfa
        } else if snapshot.is_visible(&id_selector(DONT_SHOW_AGAIN_CHECKBOX_ID)) {
            Self::StaySignedIn
        } else if snapshot.is_visible(&id_selector(PWD_ID)) {
            Self::Password
        } else if snapshot.is_visible(&id_selector(EMAIL_ID)) {
            Self::Email
        } else {
            Self::Pending
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Approved => "approved",
            Self::AllowAccess => "allow access",
            Self::ConfirmCode => "confirm code",
            Self::Mfa => "MFA",
            Self::StaySignedIn => "stay signed in",
            Self::Password => "password",
            Self::Email => "email",
            Self::Pending => "pending",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
pub(crate) fn snapshot_with(visible: &[&str], text: &str) -> PageSnapshot {
    let mut elements: HashMap<String, Option<ElementState>> = watched_selectors()
        .into_iter()
        .map(|s| (s, None))
        .collect();
    for selector in visible {
        elements.insert(
            selector.to_string(),
            Some(ElementState {
                visible: true,
                enabled: true,
            }),
        );
    }
    PageSnapshot {
        title: String::new(),
        url: String::new(),
        text: text.to_string(),
        elements,
    }
}
