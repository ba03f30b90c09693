//! RPM file name handling.
//!
//! Splits `name-[epoch:]version-release[.arch][.rpm]` strings into their
//! components. The arch token is only stripped when it is a real build
//! architecture, so dist tags like `.el9` stay part of the release.

/// Architectures recognised as a trailing `.arch` token.
const KNOWN_ARCHES: &[&str] = &[
    "src", "noarch", "x86_64", "i686", "i386", "aarch64", "ppc64le", "ppc64", "s390x", "armv7hl",
];

/// Components of an RPM file name. Fields that are not present in the
/// input are empty strings; an empty `name` means the input could not be
/// split at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nevra {
    pub name: String,
    pub version: String,
    pub release: String,
    pub epoch: String,
    pub arch: String,
}

pub fn split_filename(filename: &str) -> Nevra {
    let mut rest = filename.strip_suffix(".rpm").unwrap_or(filename);

    let mut arch = "";
    for candidate in KNOWN_ARCHES {
        let tail_len = candidate.len() + 1;
        if rest.len() > tail_len
            && rest.ends_with(candidate)
            && rest.as_bytes()[rest.len() - tail_len] == b'.'
        {
            arch = candidate;
            rest = &rest[..rest.len() - tail_len];
            break;
        }
    }

    let Some(release_idx) = rest.rfind('-') else {
        return Nevra::default();
    };
    let release = &rest[release_idx + 1..];
    let head = &rest[..release_idx];

    let Some(version_idx) = head.rfind('-') else {
        return Nevra::default();
    };
    let mut version = &head[version_idx + 1..];
    let name = &head[..version_idx];

    let mut epoch = "";
    if let Some((e, v)) = version.split_once(':') {
        epoch = e;
        version = v;
    }

    Nevra {
        name: name.to_string(),
        version: version.to_string(),
        release: release.to_string(),
        epoch: epoch.to_string(),
        arch: arch.to_string(),
    }
}

/// Package name of a source RPM file name, e.g.
/// `openstack-swift-2.23.1-1.el8.src.rpm` -> `openstack-swift`.
pub fn componentize(sourcerpm: &str) -> String {
    split_filename(sourcerpm).name
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn splits_plain_nevr() {
        let nevra = split_filename("test-1.0-1.el7ost");
        assert_eq!(nevra, Nevra {
            name: "test".to_string(),
            version: "1.0".to_string(),
            release: "1.el7ost".to_string(),
            epoch: String::new(),
            arch: String::new(),
        });
    }

    #[test]
    fn splits_nevr_with_epoch() {
        let nevra = split_filename("test-1:1.0-1.el7ost");
        assert_eq!(nevra.name, "test");
        assert_eq!(nevra.epoch, "1");
        assert_eq!(nevra.version, "1.0");
        assert_eq!(nevra.release, "1.el7ost");
    }

    #[test]
    fn splits_full_filename() {
        let nevra = split_filename("python3-sqlalchemy-1.4.45-3.el9.x86_64.rpm");
        assert_eq!(nevra, Nevra {
            name: "python3-sqlalchemy".to_string(),
            version: "1.4.45".to_string(),
            release: "3.el9".to_string(),
            epoch: String::new(),
            arch: "x86_64".to_string(),
        });
    }

    #[test]
    fn unsplittable_input_yields_empty_name() {
        assert_eq!(split_filename("1.0-1").name, "");
        assert_eq!(split_filename("no-dashes").name, "");
        assert_eq!(split_filename("").name, "");
    }

    #[test]
    fn componentizes_source_rpm() {
        assert_eq!(componentize("foo-1.2-1.src.rpm"), "foo");
        assert_eq!(componentize("openstack-swift-2.23.1-1.el8.src.rpm"), "openstack-swift");
    }
}
