//! Useful macros.

/// Given an ordered list of path components, combine them into a path string.
macro_rules! dir {
    ($first:expr $(, $part:expr)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut path = String::from($first);

        $(
            if !path.ends_with('/') {
                path.push('/');
            }
            path.extend(String::from($part).chars());
        )*

        path
    }}
}
