//! Conversion between the 0-100 percentage scale and device volume steps
//!
//! The amplifier has fewer steps than the percentage scale, so a percentage
//! does not survive a trip through the device unchanged. A step does:
//! `percent_to_step(step_to_percent(s)) == s` for every valid step.

/// Largest percentage accepted from callers
pub const MAX_PERCENT: u8 = 100;

/// `round(percent * levels / 100)`, half rounded up
pub fn percent_to_step(percent: u8, levels: u8) -> u8 {
    let percent = u32::from(percent.min(MAX_PERCENT));
    let levels = u32::from(levels);
    ((percent * levels + 50) / 100) as u8
}

/// `round(step * 100 / levels)`, half rounded up
pub fn step_to_percent(step: u8, levels: u8) -> u8 {
    if levels == 0 {
        return 0;
    }
    let step = u32::from(step.min(levels));
    let levels = u32::from(levels);
    ((step * 100 + levels / 2) / levels) as u8
}

/// Whether an echoed step confirms a requested one
///
/// Some firmware answers a volume change with one step less than was asked
/// for; echoes up to `tolerance` steps below the request count as success.
pub fn echo_confirms(requested: u8, echoed: u8, tolerance: u8) -> bool {
    echoed <= requested && requested - echoed <= tolerance
}
