//! Status derivation from raw brew records.
//!
//! Each flag is a pure function of exactly one source field (NOT_LINKED
//! additionally requires the package to be installed at all).

use crate::package::PackageStatus;

/// The raw record fields that feed [`derive_status`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFields<'a> {
    pub outdated: bool,
    pub pinned: bool,
    pub keg_only: bool,
    /// `linked_keg` as reported by brew; `None` or empty means unlinked
    pub linked_keg: Option<&'a str>,
    pub installed: bool,
    /// An installed version was built from HEAD
    pub head: bool,
    pub has_service: bool,
}

pub fn derive_status(fields: &StatusFields<'_>) -> PackageStatus {
    let mut status = PackageStatus::NONE;

    status.set(PackageStatus::OUTDATED, fields.outdated);
    status.set(PackageStatus::PINNED, fields.pinned);
    status.set(PackageStatus::KEG_ONLY, fields.keg_only);
    status.set(
        PackageStatus::NOT_LINKED,
        fields.installed && fields.linked_keg.is_none_or(str::is_empty),
    );
    status.set(PackageStatus::HEAD, fields.head);
    status.set(PackageStatus::HAS_SERVICE, fields.has_service);

    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked() -> StatusFields<'static> {
        StatusFields {
            installed: true,
            linked_keg: Some("1.0"),
            ..Default::default()
        }
    }

    #[test]
    fn test_plain_installed_package_has_no_flags() {
        assert_eq!(derive_status(&linked()), PackageStatus::NONE);
    }

    #[test]
    fn test_not_linked_requires_installed() {
        let fields = StatusFields::default();
        assert_eq!(derive_status(&fields), PackageStatus::NONE);

        let fields = StatusFields {
            installed: true,
            linked_keg: Some(""),
            ..Default::default()
        };
        assert_eq!(derive_status(&fields), PackageStatus::NOT_LINKED);
    }

    #[test]
    fn test_each_flag_depends_only_on_its_field() {
        // Walk every combination of the five boolean-driven flags
        for bits in 0u8..32 {
            let outdated = bits & 1 != 0;
            let pinned = bits & 2 != 0;
            let keg_only = bits & 4 != 0;
            let unlinked = bits & 8 != 0;
            let has_service = bits & 16 != 0;

            let fields = StatusFields {
                outdated,
                pinned,
                keg_only,
                linked_keg: if unlinked { None } else { Some("1.0") },
                installed: true,
                head: false,
                has_service,
            };
            let status = derive_status(&fields);

            assert_eq!(status.contains(PackageStatus::OUTDATED), outdated, "bits={bits}");
            assert_eq!(status.contains(PackageStatus::PINNED), pinned, "bits={bits}");
            assert_eq!(status.contains(PackageStatus::KEG_ONLY), keg_only, "bits={bits}");
            assert_eq!(status.contains(PackageStatus::NOT_LINKED), unlinked, "bits={bits}");
            assert_eq!(
                status.contains(PackageStatus::HAS_SERVICE),
                has_service,
                "bits={bits}"
            );
            assert!(!status.contains(PackageStatus::HEAD));
        }
    }

    #[test]
    fn test_pinned_never_implies_outdated() {
        let fields = StatusFields {
            pinned: true,
            ..linked()
        };
        assert_eq!(derive_status(&fields), PackageStatus::PINNED);
    }
}
