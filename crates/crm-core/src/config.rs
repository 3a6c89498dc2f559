/// Trait for loading service configuration from environment variables.
///
/// Implementors derive `serde::Deserialize` (field `foo_bar` reads `FOO_BAR`) and use
/// `#[serde(default = ...)]` for optional settings. Required fields have no default,
/// so a missing variable is reported by [`Config::try_from_env`].
pub trait Config: Sized + serde::de::DeserializeOwned {
    fn try_from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// Load from an explicit set of `(NAME, value)` pairs instead of the process
    /// environment.
    fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(pairs)
    }
}
