//! Format version thresholds
//!
//! Every version-dependent branch in the reader and writer compares the file's
//! format version against one of these constants. The constants name the last
//! version that still used the old layout, so `version <= MAX_X` means "old".

/// Format version stored in the optional `FORM` subrecord of the file header.
pub type FormatVersion = u32;

pub const DEFAULT_FORMAT_VERSION: FormatVersion = 0;
pub const CURRENT_CONTENT_FORMAT_VERSION: FormatVersion = 1;
pub const MAX_OLD_WEATHER_FORMAT_VERSION: FormatVersion = 1;
pub const MAX_OLD_DEATH_ANIMATION_FORMAT_VERSION: FormatVersion = 2;
pub const MAX_OLD_FOG_OF_WAR_FORMAT_VERSION: FormatVersion = 6;
pub const MAX_UNOPTIMIZED_CHARACTER_DATA_FORMAT_VERSION: FormatVersion = 7;
pub const MAX_OLD_TIME_LEFT_FORMAT_VERSION: FormatVersion = 8;
pub const MAX_INT_FALLBACK_FORMAT_VERSION: FormatVersion = 10;
pub const MAX_OLD_RESTOCKING_FORMAT_VERSION: FormatVersion = 14;
pub const MAX_CLEAR_MODIFIERS_FORMAT_VERSION: FormatVersion = 16;
pub const MAX_OLD_AI_PACKAGE_FORMAT_VERSION: FormatVersion = 17;
pub const MAX_OLD_SKILLS_AND_ATTRIBUTES_FORMAT_VERSION: FormatVersion = 18;
pub const MAX_OLD_CREATURE_STATS_FORMAT_VERSION: FormatVersion = 19;
/// Strings in fixed-capacity fields are NUL padded rather than length prefixed.
pub const MAX_LIMITED_SIZE_STRINGS_FORMAT_VERSION: FormatVersion = 22;
/// RefIds are plain strings rather than the tagged binary form.
pub const MAX_STRING_REF_ID_FORMAT_VERSION: FormatVersion = 23;
pub const MAX_SAVED_GAME_CELL_NAME_AS_REF_ID_FORMAT_VERSION: FormatVersion = 24;
pub const MAX_NAME_IS_REF_ID_ONLY_FORMAT_VERSION: FormatVersion = 25;
/// Cells are identified by the legacy `SPAC`/`CIDX` pair rather than a RefId.
pub const MAX_USE_ESM_CELL_ID_FORMAT_VERSION: FormatVersion = 26;
pub const MAX_ACTIVE_SPELL_SLOT_INDEX_FORMAT_VERSION: FormatVersion = 27;
pub const MAX_OLD_COUNT_FORMAT_VERSION: FormatVersion = 30;
pub const MAX_ACTIVE_SPELL_TYPE_FORMAT_VERSION: FormatVersion = 31;
pub const MAX_PLAYER_BEFORE_CELL_DATA_FORMAT_VERSION: FormatVersion = 32;
pub const CURRENT_SAVE_GAME_FORMAT_VERSION: FormatVersion = 34;

pub const MIN_SUPPORTED_SAVE_GAME_FORMAT_VERSION: FormatVersion = 5;
pub const OPENMW_0_48_SAVE_GAME_FORMAT_VERSION: FormatVersion = 21;

/// Named thresholds in ascending order, for display.
pub const FORMAT_VERSIONS: &[(&str, FormatVersion)] = &[
    ("DefaultFormatVersion", DEFAULT_FORMAT_VERSION),
    ("CurrentContentFormatVersion", CURRENT_CONTENT_FORMAT_VERSION),
    ("MaxOldWeatherFormatVersion", MAX_OLD_WEATHER_FORMAT_VERSION),
    ("MaxOldDeathAnimationFormatVersion", MAX_OLD_DEATH_ANIMATION_FORMAT_VERSION),
    ("MinSupportedSaveGameFormatVersion", MIN_SUPPORTED_SAVE_GAME_FORMAT_VERSION),
    ("MaxOldFogOfWarFormatVersion", MAX_OLD_FOG_OF_WAR_FORMAT_VERSION),
    ("MaxUnoptimizedCharacterDataFormatVersion", MAX_UNOPTIMIZED_CHARACTER_DATA_FORMAT_VERSION),
    ("MaxOldTimeLeftFormatVersion", MAX_OLD_TIME_LEFT_FORMAT_VERSION),
    ("MaxIntFallbackFormatVersion", MAX_INT_FALLBACK_FORMAT_VERSION),
    ("MaxOldRestockingFormatVersion", MAX_OLD_RESTOCKING_FORMAT_VERSION),
    ("MaxClearModifiersFormatVersion", MAX_CLEAR_MODIFIERS_FORMAT_VERSION),
    ("MaxOldAiPackageFormatVersion", MAX_OLD_AI_PACKAGE_FORMAT_VERSION),
    ("MaxOldSkillsAndAttributesFormatVersion", MAX_OLD_SKILLS_AND_ATTRIBUTES_FORMAT_VERSION),
    ("MaxOldCreatureStatsFormatVersion", MAX_OLD_CREATURE_STATS_FORMAT_VERSION),
    ("OpenMW0_48SaveGameFormatVersion", OPENMW_0_48_SAVE_GAME_FORMAT_VERSION),
    ("MaxLimitedSizeStringsFormatVersion", MAX_LIMITED_SIZE_STRINGS_FORMAT_VERSION),
    ("MaxStringRefIdFormatVersion", MAX_STRING_REF_ID_FORMAT_VERSION),
    ("MaxSavedGameCellNameAsRefIdFormatVersion", MAX_SAVED_GAME_CELL_NAME_AS_REF_ID_FORMAT_VERSION),
    ("MaxNameIsRefIdOnlyFormatVersion", MAX_NAME_IS_REF_ID_ONLY_FORMAT_VERSION),
    ("MaxUseEsmCellIdFormatVersion", MAX_USE_ESM_CELL_ID_FORMAT_VERSION),
    ("MaxActiveSpellSlotIndexFormatVersion", MAX_ACTIVE_SPELL_SLOT_INDEX_FORMAT_VERSION),
    ("MaxOldCountFormatVersion", MAX_OLD_COUNT_FORMAT_VERSION),
    ("MaxActiveSpellTypeFormatVersion", MAX_ACTIVE_SPELL_TYPE_FORMAT_VERSION),
    ("MaxPlayerBeforeCellDataFormatVersion", MAX_PLAYER_BEFORE_CELL_DATA_FORMAT_VERSION),
    ("CurrentSaveGameFormatVersion", CURRENT_SAVE_GAME_FORMAT_VERSION),
];

/// RefIds are written and read as plain strings.
pub const fn uses_string_ref_ids(version: FormatVersion) -> bool {
    version <= MAX_STRING_REF_ID_FORMAT_VERSION
}

/// Strings in fixed-capacity fields are NUL padded to the capacity.
pub const fn uses_limited_size_strings(version: FormatVersion) -> bool {
    version <= MAX_LIMITED_SIZE_STRINGS_FORMAT_VERSION
}

/// Cell identity uses the legacy `SPAC`/`CIDX` layout.
pub const fn uses_esm_cell_id(version: FormatVersion) -> bool {
    version <= MAX_USE_ESM_CELL_ID_FORMAT_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        for pair in FORMAT_VERSIONS.windows(2) {
            assert!(pair[0].1 <= pair[1].1, "{} > {}", pair[0].0, pair[1].0);
        }
    }

    #[test]
    fn test_ref_id_thresholds_are_ordered() {
        assert!(CURRENT_CONTENT_FORMAT_VERSION < MAX_LIMITED_SIZE_STRINGS_FORMAT_VERSION);
        assert!(MAX_LIMITED_SIZE_STRINGS_FORMAT_VERSION < MAX_STRING_REF_ID_FORMAT_VERSION);
        assert!(MAX_STRING_REF_ID_FORMAT_VERSION < MAX_USE_ESM_CELL_ID_FORMAT_VERSION);
        assert!(MAX_USE_ESM_CELL_ID_FORMAT_VERSION < CURRENT_SAVE_GAME_FORMAT_VERSION);
    }

    #[test]
    fn test_predicates() {
        assert!(uses_string_ref_ids(MAX_STRING_REF_ID_FORMAT_VERSION));
        assert!(!uses_string_ref_ids(MAX_STRING_REF_ID_FORMAT_VERSION + 1));
        assert!(uses_limited_size_strings(DEFAULT_FORMAT_VERSION));
        assert!(!uses_limited_size_strings(CURRENT_SAVE_GAME_FORMAT_VERSION));
        assert!(uses_esm_cell_id(MAX_USE_ESM_CELL_ID_FORMAT_VERSION));
        assert!(!uses_esm_cell_id(CURRENT_SAVE_GAME_FORMAT_VERSION));
    }
}
