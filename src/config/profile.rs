//! Build profile selection

/// 로그 상세도 프로필
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Standard,
    Verbose,
    Quiet,
}

#[inline]
pub const fn current_profile() -> Profile {
    // `verbose`가 `quiet`보다 우선
    if cfg!(feature = "verbose") {
        Profile::Verbose
    } else if cfg!(feature = "quiet") {
        Profile::Quiet
    } else {
        Profile::Standard
    }
}
