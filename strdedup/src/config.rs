use crate::Error;

/// When a pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerMode {
    /// Synchronously from the collection-started notification.
    #[default]
    CollectionStarted,
    /// Once a suspend for collection has finished suspending every thread.
    RuntimeSuspend,
}

#[derive(Debug, Default, Clone)]
pub struct ProfilerCreateInfo {
    /// Fewer generations than this skip the pass.
    pub min_generations: Option<usize>,
    /// Youngest generation whose segments and text objects are considered.
    pub oldest_generation: Option<u32>,
    pub trigger: Option<TriggerMode>,
    pub text_type_name: Option<String>,
    /// Bytes per character of the text type.
    pub char_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilerSettings {
    pub min_generations: usize,
    pub oldest_generation: u32,
    pub trigger: TriggerMode,
    pub text_type_name: String,
    pub char_size: usize,
}

impl Default for ProfilerSettings {
    fn default() -> Self {
        Self {
            min_generations: 3,
            oldest_generation: 2,
            trigger: TriggerMode::CollectionStarted,
            text_type_name: "System.String".to_string(),
            char_size: 2, // UTF-16
        }
    }
}

impl ProfilerSettings {
    pub fn from_info(info: ProfilerCreateInfo) -> Result<Self, Error> {
        let mut settings = Self::default();
        info.min_generations
            .inspect(|&val| settings.min_generations = val);
        info.oldest_generation
            .inspect(|&val| settings.oldest_generation = val);
        info.trigger.inspect(|&val| settings.trigger = val);
        info.char_size.inspect(|&val| settings.char_size = val);
        if let Some(name) = info.text_type_name {
            settings.text_type_name = name;
        }

        settings.validate().map_err(Error::Config)?;
        Ok(settings)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.oldest_generation as usize >= self.min_generations {
            return Err("oldest_generation must be below min_generations");
        }
        if !matches!(self.char_size, 1 | 2 | 4) {
            return Err("char_size must be 1, 2 or 4");
        }
        if self.text_type_name.is_empty() {
            return Err("text_type_name must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_three_generation_runtime() {
        let settings = ProfilerSettings::from_info(Default::default()).unwrap();
        assert_eq!(settings, ProfilerSettings::default());
        assert_eq!(settings.min_generations, 3);
        assert_eq!(settings.oldest_generation, 2);
        assert_eq!(settings.trigger, TriggerMode::CollectionStarted);
    }

    #[test]
    fn create_info_overrides_defaults() {
        let info = ProfilerCreateInfo {
            min_generations: Some(4),
            trigger: Some(TriggerMode::RuntimeSuspend),
            text_type_name: Some("Lang.Text".into()),
            ..Default::default()
        };
        let settings = ProfilerSettings::from_info(info).unwrap();
        assert_eq!(settings.min_generations, 4);
        assert_eq!(settings.oldest_generation, 2);
        assert_eq!(settings.trigger, TriggerMode::RuntimeSuspend);
        assert_eq!(settings.text_type_name, "Lang.Text");
    }

    #[test]
    fn invalid_combinations_are_rejected() {
        let info = ProfilerCreateInfo {
            min_generations: Some(2),
            ..Default::default()
        };
        assert!(matches!(
            ProfilerSettings::from_info(info),
            Err(Error::Config(_))
        ));

        let info = ProfilerCreateInfo {
            char_size: Some(3),
            ..Default::default()
        };
        assert!(ProfilerSettings::from_info(info).is_err());

        let info = ProfilerCreateInfo {
            text_type_name: Some(String::new()),
            ..Default::default()
        };
        assert!(ProfilerSettings::from_info(info).is_err());
    }
}
