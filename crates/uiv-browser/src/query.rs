//! In-page locator resolution
//!
//! Locators are resolved by one script evaluated in the page. The locator and
//! arguments are embedded as JSON literals, never spliced in as raw text, and
//! the script always returns a JSON string so the result survives CDP's
//! by-reference object handling.

use serde::Serialize;
use uiv_core::{Locator, Result};

/// What the resolver should do with the matches
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Action {
    Snapshot,
    Click { index: usize },
}

const RESOLVER: &str = r#"function (locator, attributes, action) {
  const IMPLICIT = {
    button: 'button, input[type=button], input[type=submit], input[type=reset], input[type=image], summary',
    link: 'a[href], area[href]',
    navigation: 'nav',
    combobox: 'select:not([multiple]):not([size]), input[list]',
    listbox: 'select[multiple], select[size], datalist',
    textbox: 'input:not([type]), input[type=text], input[type=email], input[type=tel], input[type=url], textarea',
    searchbox: 'input[type=search]',
    checkbox: 'input[type=checkbox]',
    radio: 'input[type=radio]',
    slider: 'input[type=range]',
    spinbutton: 'input[type=number]',
    heading: 'h1, h2, h3, h4, h5, h6',
    main: 'main',
    banner: 'header',
    contentinfo: 'footer',
    complementary: 'aside',
    img: 'img:not([alt=""])',
    list: 'ul, ol',
    listitem: 'li',
    region: 'section[aria-label], section[aria-labelledby]',
    form: 'form',
    dialog: 'dialog',
    progressbar: 'progress',
    table: 'table',
    row: 'tr',
    cell: 'td',
    option: 'option',
  };
  const NAME_FROM_CONTENT = new Set([
    'button', 'link', 'heading', 'cell', 'row', 'option', 'tab', 'listitem',
    'menuitem', 'checkbox', 'radio', 'switch', 'treeitem', 'tooltip',
  ]);
  const collapse = (s) => (s || '').replace(/\s+/g, ' ').trim();

  const roleOf = (el) => {
    const explicit = el.getAttribute('role');
    if (explicit && explicit.trim()) return explicit.trim().split(/\s+/)[0];
    for (const [role, selector] of Object.entries(IMPLICIT)) {
      if (el.matches(selector)) return role;
    }
    return null;
  };

  const nameOf = (el) => {
    const labelledBy = el.getAttribute('aria-labelledby');
    if (labelledBy) {
      const parts = labelledBy.split(/\s+/)
        .map((id) => document.getElementById(id))
        .filter(Boolean)
        .map((node) => collapse(node.textContent));
      if (parts.length) return collapse(parts.join(' '));
    }
    const label = el.getAttribute('aria-label');
    if (label && label.trim()) return collapse(label);
    if (el.labels && el.labels.length) {
      return collapse(Array.from(el.labels).map((l) => l.textContent).join(' '));
    }
    if (el.matches('img, area, input[type=image]') && el.getAttribute('alt')) {
      return collapse(el.getAttribute('alt'));
    }
    if (el.matches('input[type=button], input[type=submit], input[type=reset]')) {
      const fallback = el.type === 'submit' ? 'Submit' : el.type === 'reset' ? 'Reset' : '';
      return collapse(el.value || fallback);
    }
    if (NAME_FROM_CONTENT.has(roleOf(el))) {
      const text = collapse(el.textContent);
      if (text) return text;
    }
    return collapse(el.getAttribute('title') || el.getAttribute('placeholder') || '');
  };

  const isVisible = (el) => {
    if (!el.getClientRects().length) return false;
    const style = getComputedStyle(el);
    return style.visibility !== 'hidden' && style.visibility !== 'collapse';
  };

  // Not rendered, or pruned from the accessibility tree
  const hiddenFromTree = (el) => !!el.closest('[aria-hidden="true"]') || !isVisible(el);

  const nameMatches = (el, loc) => {
    if (loc.name === undefined || loc.name === null) return true;
    const actual = nameOf(el);
    const wanted = collapse(loc.name);
    return loc.exact ? actual === wanted : actual.toLowerCase().includes(wanted.toLowerCase());
  };

  const resolve = (loc, root) => {
    switch (loc.by) {
      case 'css':
        return Array.from(root.querySelectorAll(loc.selector));
      case 'role':
        return Array.from(root.querySelectorAll('*')).filter(
          (el) => roleOf(el) === loc.role && !hiddenFromTree(el) && nameMatches(el, loc));
      case 'within': {
        const parents = resolve(loc.parent, root);
        return parents.length ? resolve(loc.child, parents[0]) : [];
      }
      default:
        throw new Error('unsupported locator: ' + loc.by);
    }
  };

  const read = (el, name) => name.startsWith('style:')
    ? getComputedStyle(el).getPropertyValue(name.slice(6)).trim()
    : el.getAttribute(name);

  const matches = resolve(locator, document);

  if (action.op === 'click') {
    const el = matches[action.index];
    if (!el) throw new Error('element detached: no match at index ' + action.index);
    el.scrollIntoView({ block: 'center', inline: 'center' });
    el.click();
    return JSON.stringify({ clicked: matches.length });
  }

  return JSON.stringify(matches.map((el) => {
    const rect = el.getBoundingClientRect();
    const values = {};
    for (const name of attributes) values[name] = read(el, name);
    return {
      visible: isVisible(el),
      text: el.textContent || '',
      attributes: values,
      bounds: rect.width && rect.height
        ? { x: rect.left + window.scrollX, y: rect.top + window.scrollY, width: rect.width, height: rect.height }
        : null,
    };
  }));
}"#;

fn build(locator: &Locator, attributes: &[String], action: &Action) -> Result<String> {
    Ok(format!(
        "({})({}, {}, {})",
        RESOLVER,
        serde_json::to_string(locator)?,
        serde_json::to_string(attributes)?,
        serde_json::to_string(action)?,
    ))
}

/// Script returning a JSON array of element snapshots
pub fn snapshot_script(locator: &Locator, attributes: &[String]) -> Result<String> {
    build(locator, attributes, &Action::Snapshot)
}

/// Script clicking the `index`-th match
pub fn click_script(locator: &Locator, index: usize) -> Result<String> {
    build(locator, &[], &Action::Click { index })
}
