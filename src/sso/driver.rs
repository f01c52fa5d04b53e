/// The page driver boundary.
///
/// The coordinator never inspects markup; everything it learns about the
/// remote page arrives through injected probe scripts evaluated by the
/// driver. Probe delivery is modeled as a request/response call rather
/// than ad hoc callbacks.
use crate::error::GateResult;
use async_trait::async_trait;

/// Abstract contract to the rendered remote page
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Point the page at `url`
    async fn navigate(&self, url: &str) -> GateResult<()>;

    /// Evaluate `script` inside the page and return its text result.
    /// An empty string means the queried element is absent.
    async fn inject_probe(&self, script: &str) -> GateResult<String>;

    /// Resolve once the current navigation has finished loading
    async fn wait_for_load(&self) -> GateResult<()>;
}

/// Script reading an HTML property of the element at `xpath`, or the
/// empty string when no element matches.
pub fn xpath_property_probe(xpath: &str, property: &str) -> String {
    format!(
        r#"var element = document.evaluate("{xpath}", document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
element ? element.{property} : '';"#
    )
}

/// Script detecting the authenticated-session marker on the landing page
pub fn login_marker_probe() -> String {
    r#"var marker = document.querySelector("div#user_dropdown");
marker ? marker.innerText : '';"#
        .to_string()
}

/// Script reading one labeled profile field from the profile page
pub fn profile_field_probe(field: &str) -> String {
    xpath_property_probe(&format!("//div/label[@for='{field}']/.."), "textContent")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xpath_probe_embeds_xpath_and_property() {
        let script = xpath_property_probe("//input[@id='login']", "value");
        assert!(script.contains("//input[@id='login']"));
        assert!(script.contains("element.value"));
        assert!(script.contains("FIRST_ORDERED_NODE_TYPE"));
    }

    #[test]
    fn test_profile_field_probe_targets_label() {
        let script = profile_field_probe("email");
        assert!(script.contains("label[@for='email']"));
        assert!(script.contains("textContent"));
    }
}
