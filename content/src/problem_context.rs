//! URL → problem identity for the supported coding sites.

use once_cell::sync::Lazy;
use regex::Regex;
use shared_types::{Platform, ProblemContext};
use url::Url;

static LEETCODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/problems/([^/]+)").expect("valid leetcode pattern"));
static CODEFORCES_CONTEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(?:contest|gym)/(\d+)/problem/([A-Za-z0-9]+)").expect("valid codeforces pattern")
});
static CODEFORCES_PROBLEMSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/problemset/problem/(\d+)/([A-Za-z0-9]+)").expect("valid codeforces pattern")
});
static ATCODER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/contests/[^/]+/tasks/([^/]+)").expect("valid atcoder pattern")
});
static HACKERRANK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/challenges/([^/]+)").expect("valid hackerrank pattern"));

/// Registrable domains per site; any subdomain (`www.`, `m.`, mirrors) counts.
const SITES: &[(&str, Platform)] = &[
    ("leetcode.com", Platform::Leetcode),
    ("leetcode.cn", Platform::Leetcode),
    ("codeforces.com", Platform::Codeforces),
    ("atcoder.jp", Platform::Atcoder),
    ("hackerrank.com", Platform::Hackerrank),
];

fn platform_for(host: &str) -> Option<Platform> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    SITES.iter().find_map(|(domain, platform)| {
        let matches = host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|sub| sub.ends_with('.'));
        matches.then_some(*platform)
    })
}

/// Problem shown at `url`, or `None` for any other page.
pub fn resolve(url: &str) -> Option<ProblemContext> {
    let url = Url::parse(url).ok()?;
    let platform = platform_for(url.host_str()?)?;
    let path = url.path();

    match platform {
        Platform::Leetcode => {
            let slug = capture(&LEETCODE, path, 1)?;
            Some(ProblemContext::new(Platform::Leetcode, slug.to_lowercase()))
        }
        Platform::Codeforces => {
            let caps = CODEFORCES_CONTEST
                .captures(path)
                .or_else(|| CODEFORCES_PROBLEMSET.captures(path))?;
            let slug = format!("{}-{}", &caps[1], caps[2].to_uppercase());
            Some(ProblemContext::new(Platform::Codeforces, slug))
        }
        Platform::Atcoder => {
            let task = capture(&ATCODER, path, 1)?;
            Some(ProblemContext::new(Platform::Atcoder, task.to_lowercase()))
        }
        Platform::Hackerrank => {
            let slug = capture(&HACKERRANK, path, 1)?;
            Some(ProblemContext::new(Platform::Hackerrank, slug.to_lowercase()))
        }
    }
}

fn capture<'a>(pattern: &Regex, path: &'a str, group: usize) -> Option<&'a str> {
    pattern
        .captures(path)
        .and_then(|caps| caps.get(group))
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(platform: Platform, slug: &str) -> Option<ProblemContext> {
        Some(ProblemContext::new(platform, slug))
    }

    #[test]
    fn test_leetcode() {
        assert_eq!(
            resolve("https://leetcode.com/problems/two-sum/description/"),
            ctx(Platform::Leetcode, "two-sum")
        );
        assert_eq!(
            resolve("https://leetcode.cn/problems/Two-Sum"),
            ctx(Platform::Leetcode, "two-sum")
        );
        assert_eq!(resolve("https://leetcode.com/problemset/"), None);
    }

    #[test]
    fn test_codeforces_both_patterns() {
        assert_eq!(
            resolve("https://codeforces.com/contest/1500/problem/C"),
            ctx(Platform::Codeforces, "1500-C")
        );
        assert_eq!(
            resolve("https://codeforces.com/problemset/problem/1500/c1?locale=en"),
            ctx(Platform::Codeforces, "1500-C1")
        );
        assert_eq!(resolve("https://codeforces.com/contest/1500"), None);
    }

    #[test]
    fn test_atcoder() {
        assert_eq!(
            resolve("https://atcoder.jp/contests/abc300/tasks/ABC300_A"),
            ctx(Platform::Atcoder, "abc300_a")
        );
    }

    #[test]
    fn test_hackerrank() {
        assert_eq!(
            resolve("https://www.hackerrank.com/challenges/Simple-Array-Sum/problem"),
            ctx(Platform::Hackerrank, "simple-array-sum")
        );
    }

    #[test]
    fn test_subdomains_and_mirrors() {
        assert_eq!(
            resolve("https://m.codeforces.com/contest/1500/problem/C"),
            ctx(Platform::Codeforces, "1500-C")
        );
        assert_eq!(
            resolve("https://mirror.codeforces.com/problemset/problem/4/A"),
            ctx(Platform::Codeforces, "4-A")
        );
        assert_eq!(
            resolve("https://www.leetcode.com/problems/two-sum/"),
            ctx(Platform::Leetcode, "two-sum")
        );
        assert_eq!(resolve("https://notcodeforces.com/contest/1500/problem/C"), None);
        assert_eq!(resolve("https://codeforces.com.evil.example/contest/1500/problem/C"), None);
    }

    #[test]
    fn test_unknown_pages() {
        assert_eq!(resolve("https://example.com/problems/two-sum"), None);
        assert_eq!(resolve("not a url"), None);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for url in [
            "https://leetcode.com/problems/Two-Sum",
            "https://codeforces.com/contest/1500/problem/c",
            "https://atcoder.jp/contests/abc300/tasks/ABC300_A",
            "https://www.hackerrank.com/challenges/Simple-Array-Sum",
        ] {
            let first = resolve(url).unwrap();
            let again = match first.platform {
                Platform::Leetcode => format!("https://leetcode.com/problems/{}", first.slug),
                Platform::Codeforces => {
                    let (id, index) = first.slug.split_once('-').unwrap();
                    format!("https://codeforces.com/contest/{id}/problem/{index}")
                }
                Platform::Atcoder => format!("https://atcoder.jp/contests/x/tasks/{}", first.slug),
                Platform::Hackerrank => {
                    format!("https://www.hackerrank.com/challenges/{}", first.slug)
                }
            };
            assert_eq!(resolve(&again), Some(first.clone()));
            assert_eq!(resolve(url), Some(first));
        }
    }
}
