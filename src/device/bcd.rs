//! Parsing of `bcdedit /enum` output.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DeviceError;

static DISPLAY_BOOT_MENU_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^\s*displaybootmenu\s+(yes|no)\s*$").expect("Invalid displaybootmenu regex")
});

static IDENTIFIER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^\s*identifier\s+(\{[^}]+\})\s*$").expect("Invalid identifier regex"));

/// Read the boot menu flag from `bcdedit /enum {bootmgr}`.
///
/// bcdedit omits the element when it was never set, which means the menu is hidden.
pub fn parse_display_boot_menu(output: &str) -> Result<bool, DeviceError> {
    if !IDENTIFIER_REGEX.is_match(output) {
        return Err(DeviceError::Parse(format!(
            "bcdedit output contains no boot object: {}",
            output.lines().next().unwrap_or("").trim()
        )));
    }

    Ok(DISPLAY_BOOT_MENU_REGEX
        .captures(output)
        .map(|caps| caps[1].eq_ignore_ascii_case("yes"))
        .unwrap_or(false))
}

/// Identifiers of every object listed in `bcdedit /enum` output, in order.
pub fn parse_identifiers(output: &str) -> Vec<String> {
    IDENTIFIER_REGEX
        .captures_iter(output)
        .map(|caps| caps[1].to_string())
        .collect()
}

pub fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOTMGR_WITH_MENU: &str = "\
Windows Boot Manager
--------------------
identifier              {bootmgr}
device                  partition=\\Device\\HarddiskVolume27
path                    \\EFI\\Microsoft\\Boot\\bootmgfw.efi
description             Windows Boot Manager
default                 {7619dcc9-fafe-11d9-b411-000476eba25f}
displayorder            {7619dcc9-fafe-11d9-b411-000476eba25f}
                        {01de5a27-8705-40db-bad6-96fa5187d4a6}
timeout                 5
displaybootmenu         Yes
";

    #[test]
    fn test_menu_enabled() {
        assert!(parse_display_boot_menu(BOOTMGR_WITH_MENU).expect("parse"));
    }

    #[test]
    fn test_menu_disabled() {
        let output = BOOTMGR_WITH_MENU.replace("displaybootmenu         Yes", "displaybootmenu         No");
        assert!(!parse_display_boot_menu(&output).expect("parse"));
    }

    #[test]
    fn test_missing_element_means_hidden() {
        let output = BOOTMGR_WITH_MENU.replace("displaybootmenu         Yes\n", "");
        assert!(!parse_display_boot_menu(&output).expect("parse"));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let err = parse_display_boot_menu("The boot configuration data store could not be opened.").unwrap_err();
        assert!(matches!(err, DeviceError::Parse(_)));
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(parse_identifiers(BOOTMGR_WITH_MENU), vec!["{bootmgr}".to_string()]);
    }
}
