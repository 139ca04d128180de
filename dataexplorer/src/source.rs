//! Remote data source references.

use crate::Error;

/// Identifies a single file within a branch of a remote repository.
///
/// Parsed from URLs of the form
/// `https://github.com/<owner>/<repo>/blob/<branch>/<path...>`, where only the
/// position of each segment matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSourceRef {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub path: String,
}

const OWNER_SEGMENT: usize = 3;
const REPO_SEGMENT: usize = 4;
const BRANCH_SEGMENT: usize = 6;
const PATH_START_SEGMENT: usize = 7;

impl RemoteSourceRef {
    pub fn parse<S: AsRef<str>>(url: S) -> Result<Self, Error> {
        let url = url.as_ref();
        let segments = url.split('/').collect::<Vec<&str>>();
        let segment = |idx: usize, what: &str| -> Result<String, Error> {
            match segments.get(idx) {
                Some(s) if !s.is_empty() => Ok(s.to_string()),
                _ => Err(Error::InvalidSourceUrl(
                    url.to_string(),
                    format!("missing {} segment", what),
                )),
            }
        };
        let owner = segment(OWNER_SEGMENT, "owner")?;
        let repo = segment(REPO_SEGMENT, "repository")?;
        let branch = segment(BRANCH_SEGMENT, "branch")?;
        let path = segments
            .get(PATH_START_SEGMENT..)
            .map(|rest| rest.join("/"))
            .unwrap_or_default();
        if path.is_empty() {
            return Err(Error::InvalidSourceUrl(
                url.to_string(),
                "missing file path".to_string(),
            ));
        }
        Ok(Self {
            owner,
            repo,
            branch,
            path,
        })
    }
}

impl std::fmt::Display for RemoteSourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}@{}:{}",
            self.owner, self.repo, self.branch, self.path
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_blob_url() {
        let r = RemoteSourceRef::parse(
            "https://github.com/datasets/gdp/blob/master/data/nested/gdp.csv",
        )
        .unwrap();
        assert_eq!(
            r,
            RemoteSourceRef {
                owner: "datasets".to_string(),
                repo: "gdp".to_string(),
                branch: "master".to_string(),
                path: "data/nested/gdp.csv".to_string(),
            }
        );
        assert_eq!(r.to_string(), "datasets/gdp@master:data/nested/gdp.csv");
    }

    #[test]
    fn rejects_short_urls() {
        assert!(matches!(
            RemoteSourceRef::parse("https://github.com/datasets/gdp"),
            Err(Error::InvalidSourceUrl(_, _))
        ));
        assert!(matches!(
            RemoteSourceRef::parse("https://github.com/datasets/gdp/blob/master"),
            Err(Error::InvalidSourceUrl(_, _))
        ));
    }
}
