use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq)]
pub enum Setting {
    String(String),
}

impl Setting {
    fn as_string(&self) -> &String {
        let Setting::String(value) = self;
        value
    }
}

impl From<&str> for Setting {
    fn from(value: &str) -> Self {
        Setting::String(value.to_string())
    }
}

impl From<String> for Setting {
    fn from(value: String) -> Self {
        Setting::String(value)
    }
}

pub trait Settings {
    fn get(&self, key: &str) -> Option<Setting>;
    fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(|setting| setting.as_string().clone())
    }
    /// Like [`Settings::get_string`], but an empty string counts as unset.
    fn get_non_empty_string(&self, key: &str) -> Option<String> {
        self.get_string(key).filter(|value| !value.is_empty())
    }
    fn set(&mut self, key: &str, value: Setting);
    fn set_string(&mut self, key: &str, value: String) {
        self.set(key, Setting::String(value));
    }
}

/// Option bag whose keys are matched without regard to case, so
/// `trustedCertificates` and `trustedcertificates` name the same option.
#[derive(Clone, Debug, Default)]
pub struct CaseInsensitiveSettings {
    values: HashMap<String, Setting>,
}

impl CaseInsensitiveSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Setting>) -> Self {
        self.set(key, value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Settings for CaseInsensitiveSettings {
    fn get(&self, key: &str) -> Option<Setting> {
        self.values.get(&key.to_lowercase()).cloned()
    }

    fn set(&mut self, key: &str, value: Setting) {
        self.values.insert(key.to_lowercase(), value);
    }
}

impl<K, V> FromIterator<(K, V)> for CaseInsensitiveSettings
where
    K: AsRef<str>,
    V: Into<Setting>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut settings = CaseInsensitiveSettings::new();
        for (key, value) in iter {
            settings.set(key.as_ref(), value.into());
        }
        settings
    }
}
