/// Human-readable name from an APK file or package name,
/// e.g. `my_vpn-client-release` -> `My VPN Client`.
pub fn to_pretty_name(raw: &str) -> String {
    // 1. Basic cleaning and splitting
    let parts: Vec<&str> = raw.split(['-', '_', ' ']).collect();

    // 2. Capitalization logic
    let pretty: Vec<String> = parts
        .into_iter()
        .map(|part| {
            match part.to_lowercase().as_str() {
                "api" => "API".to_string(),
                "sdk" => "SDK".to_string(),
                "vpn" => "VPN".to_string(),
                "pdf" => "PDF".to_string(),
                "gps" => "GPS".to_string(),
                "tv" => "TV".to_string(),
                // Build-variant noise
                "release" | "debug" | "signed" | "unsigned" | "universal" => "".to_string(),
                "" => "".to_string(),
                _ => {
                    let mut chars = part.chars();
                    match chars.next() {
                        None => String::new(),
                        Some(f) => f.to_uppercase().collect::<String>() + chars.as_str(),
                    }
                }
            }
        })
        .filter(|p| !p.is_empty())
        .collect();

    if pretty.is_empty() {
        return raw.to_string();
    }

    pretty.join(" ")
}

/// Display name for an APK that has no `nombre`: last URL segment without
/// query, `.apk` suffix or reverse-domain prefix.
pub fn apk_display_name(apk_url: &str) -> String {
    let without_query = apk_url.split(['?', '#']).next().unwrap_or(apk_url);
    // Blob-store URLs encode the object path as a single segment
    let decoded = without_query.replace("%2F", "/").replace("%2f", "/");
    let file = decoded.rsplit('/').next().unwrap_or(&decoded);
    let stem = file
        .strip_suffix(".apk")
        .or_else(|| file.strip_suffix(".APK"))
        .unwrap_or(file);
    // com.example.notes -> notes
    let stem = if stem.matches('.').count() >= 2 {
        stem.rsplit('.').next().unwrap_or(stem)
    } else {
        stem
    };
    to_pretty_name(stem)
}
