/// The supported output formats for encoded clip lists.
///
/// Why this exists:
/// - We want a single, strongly-typed representation of output formats
///   across the CLI and library code.
/// - Using an enum avoids stringly-typed conditionals and keeps format
///   selection explicit and discoverable.
///
/// Integration notes:
/// - With the `cli` feature, `ValueEnum` allows this enum to be used directly
///   as a CLI flag with `clap`.
/// - Each variant maps to a concrete `ClipEncoder` implementation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputType {
    /// Output clips as a JSON array.
    Json,

    /// Output clips as a human-readable table.
    Text,
}
