use std::fmt;
use std::str::FromStr;

/// `name[@version]`, where `name` may be scoped (`@scope/name`). A missing
/// version means the `latest` dist-tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
}

impl FromStr for PackageRef {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        // The scope's own `@` is never the version separator.
        let (name, version) = match input.rfind('@') {
            Some(index) if index > 0 => (&input[..index], &input[index + 1..]),
            _ => (input, "latest"),
        };
        if name.is_empty() || name == "@" || name.ends_with('/') {
            return Err(format!("invalid package name in `{input}`"));
        }
        if version.is_empty() {
            return Err(format!("missing version after `@` in `{input}`"));
        }
        Ok(Self { name: name.to_string(), version: version.to_string() })
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("react@18.2.0", "react", "18.2.0")]
    #[case("react", "react", "latest")]
    #[case("react@next", "react", "next")]
    #[case("@babel/core@7.24.0", "@babel/core", "7.24.0")]
    #[case("@babel/core", "@babel/core", "latest")]
    fn parses(#[case] input: &str, #[case] name: &str, #[case] version: &str) {
        let parsed: PackageRef = input.parse().unwrap();
        assert_eq!(parsed, PackageRef { name: name.to_string(), version: version.to_string() });
    }

    #[rstest]
    #[case("")]
    #[case("@")]
    #[case("react@")]
    #[case("@scope/@1.0.0")]
    fn rejects(#[case] input: &str) {
        assert!(input.parse::<PackageRef>().is_err());
    }

    #[test]
    fn displays_round() {
        assert_eq!("@scope/pkg@1.0.0".parse::<PackageRef>().unwrap().to_string(), "@scope/pkg@1.0.0");
    }
}
