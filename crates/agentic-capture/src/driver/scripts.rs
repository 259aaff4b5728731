//! JavaScript evaluated inside pages by the Chromium driver.

/// Elements a bare button text is matched against.
pub const CLICKABLE: &str = "a, button, input[type=button], input[type=submit], \
    [role=button], [role=link], [role=menuitem], [role=tab], [onclick], summary, label";

pub const READY_STATE: &str = "document.readyState";

pub const DOCUMENT_INFO: &str = r#"
(() => {
    const viewer = Array.from(document.querySelectorAll('embed[type], object[type]'))
        .some(el => (el.getAttribute('type') || '').startsWith('application/'));
    return {
        url: location.href,
        content_type: document.contentType || null,
        embedded_viewer: viewer,
    };
})()
"#;

pub const LINKS: &str = r#"
(() => Array.from(document.querySelectorAll('a[href], iframe[src], frame[src], embed[src], object[data]'))
    .map(el => el.href || el.src || el.data || '')
    .filter(Boolean))()
"#;

pub const INLINE_SCRIPTS: &str = r#"
(() => {
    const parts = Array.from(document.scripts)
        .filter(s => !s.src)
        .map(s => s.textContent || '');
    document.querySelectorAll('[onclick], a[href^="javascript:"]').forEach(el => {
        parts.push(el.getAttribute('onclick') || '');
        parts.push(el.getAttribute('href') || '');
    });
    return parts.join('\n');
})()
"#;

pub const NUDGE: &str = "(() => { if (document.body) { document.body.click(); } return true; })()";

/// In-page fetch with the page's cookies. Resolves to
/// `{status, contentType, data}` with base64 data, or `{error}`.
pub fn fetch(url: &str, timeout_ms: u64) -> String {
    let url = serde_json::Value::String(url.to_string());
    format!(
        r#"
(async () => {{
    const controller = new AbortController();
    const timer = setTimeout(() => controller.abort(), {timeout_ms});
    try {{
        const response = await fetch({url}, {{
            method: 'GET',
            credentials: 'include',
            signal: controller.signal,
        }});
        const bytes = new Uint8Array(await response.arrayBuffer());
        let binary = '';
        for (let i = 0; i < bytes.length; i += 0x8000) {{
            binary += String.fromCharCode.apply(null, bytes.subarray(i, i + 0x8000));
        }}
        return {{
            status: response.status,
            contentType: response.headers.get('content-type'),
            data: btoa(binary),
        }};
    }} catch (e) {{
        return {{ error: String(e) }};
    }} finally {{
        clearTimeout(timer);
    }}
}})()
"#
    )
}

/// Navigation hook. Calls `window[binding]` with `{kind, url}` JSON whenever
/// the page is about to open or navigate to a URL matching `pattern`.
pub fn hook(binding: &str, pattern: &str) -> String {
    let binding = serde_json::Value::String(binding.to_string());
    let pattern = serde_json::Value::String(pattern.to_string());
    format!(
        r#"
(() => {{
    const binding = {binding};
    const flag = '__captureHook_' + binding;
    if (window[flag]) {{ return true; }}
    window[flag] = true;
    const pattern = new RegExp({pattern}, 'i');
    const report = (url, kind) => {{
        try {{
            if (!url) {{ return; }}
            const href = new URL(String(url), document.baseURI).href;
            if (!pattern.test(href)) {{ return; }}
            const callback = window[binding];
            if (typeof callback === 'function') {{
                callback(JSON.stringify({{ kind, url: href }}));
            }}
        }} catch (e) {{}}
    }};

    const open = window.open;
    window.open = function (url, ...rest) {{
        report(url, 'window.open');
        return open.call(this, url, ...rest);
    }};

    if (window.navigation) {{
        window.navigation.addEventListener('navigate', e => {{
            report(e.destination && e.destination.url, 'navigate');
        }});
    }}

    document.addEventListener('click', e => {{
        const anchor = e.target && e.target.closest && e.target.closest('a[href]');
        if (anchor) {{ report(anchor.href, 'link'); }}
    }}, true);

    document.addEventListener('submit', e => {{
        if (e.target && e.target.action) {{ report(e.target.action, 'form'); }}
    }}, true);

    const submit = HTMLFormElement.prototype.submit;
    HTMLFormElement.prototype.submit = function () {{
        report(this.action, 'form');
        return submit.call(this);
    }};

    const anchorClick = HTMLAnchorElement.prototype.click;
    HTMLAnchorElement.prototype.click = function () {{
        report(this.href, 'link');
        return anchorClick.call(this);
    }};

    const src = Object.getOwnPropertyDescriptor(HTMLIFrameElement.prototype, 'src');
    if (src && src.set) {{
        Object.defineProperty(HTMLIFrameElement.prototype, 'src', {{
            get: src.get,
            set(value) {{
                report(value, 'iframe');
                return src.set.call(this, value);
            }},
            configurable: true,
            enumerable: src.enumerable,
        }});
    }}
    return true;
}})()
"#
    )
}

/// Overwrites the binding with a no-op. Removing it could break page code
/// that still holds a reference.
pub fn deactivate_hook(binding: &str) -> String {
    let binding = serde_json::Value::String(binding.to_string());
    format!("(() => {{ try {{ window[{binding}] = function () {{}}; }} catch (e) {{}} return true; }})()")
}

pub fn fill(value: &str) -> String {
    let value = serde_json::Value::String(value.to_string());
    format!(
        r#"function () {{
    this.focus();
    this.value = {value};
    this.dispatchEvent(new Event('input', {{ bubbles: true }}));
    this.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}}"#
    )
}

/// Selects options by value or label. Returns the number selected.
pub fn select(values: &[String]) -> String {
    let values = serde_json::Value::from(values.to_vec());
    format!(
        r#"function () {{
    const wanted = {values};
    let hits = 0;
    for (const option of Array.from(this.options || [])) {{
        option.selected = wanted.includes(option.value) || wanted.includes(option.label);
        if (option.selected) {{ hits += 1; }}
    }}
    this.dispatchEvent(new Event('input', {{ bubbles: true }}));
    this.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return hits;
}}"#
    )
}
