/// Default in-region coordinates used when a start location omits them
const DEFAULT_X: i32 = 128;
const DEFAULT_Y: i32 = 128;
const DEFAULT_Z: i32 = 0;

/// Canonicalize an operator-supplied start location for the login service.
///
/// `home` and `last` pass through. Anything else is read as
/// `<region>[/x[/y[/z]]]` and rendered as `uri:<region>&<x>&<y>&<z>`;
/// missing or unparsable coordinates keep their defaults.
pub fn parse_start_location(input: &str) -> String {
    if input == "home" || input == "last" {
        return input.to_string();
    }

    let mut parts = input.split('/');
    let region = parts.next().unwrap_or_default();
    let mut coords = [DEFAULT_X, DEFAULT_Y, DEFAULT_Z];
    for (slot, part) in coords.iter_mut().zip(parts) {
        if let Ok(value) = part.trim().parse::<i32>() {
            *slot = value;
        }
    }

    format!("uri:{}&{}&{}&{}", region, coords[0], coords[1], coords[2])
}

/// Split a canonical `uri:` location back into region name and coordinates
pub fn split_start_uri(location: &str) -> Option<(&str, [i32; 3])> {
    let rest = location.strip_prefix("uri:")?;
    let mut parts = rest.split('&');
    let region = parts.next()?;
    let mut coords = [DEFAULT_X, DEFAULT_Y, DEFAULT_Z];
    for (slot, part) in coords.iter_mut().zip(parts) {
        *slot = part.parse().ok()?;
    }
    Some((region, coords))
}
