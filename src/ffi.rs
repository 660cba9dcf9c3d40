//! C-compatible FFI API for cross-language bindings.
//!
//! # ABI Contract
//!
//! All exported functions use `extern "C"` calling convention and `#[no_mangle]`
//! to ensure stable symbol names.
//!
//! ## Memory management
//! - Buffers returned by `mdpdf_*` functions are allocated on the Rust heap.
//! - Callers **must** free them with `mdpdf_free_buffer` / `mdpdf_free_string`.
//! - Passing a null pointer to a free function is a no-op.
//!
//! ## Options
//! Export options are passed as a null-terminated JSON object using the same
//! camelCase keys as [`Options`]. `NULL` means all defaults.
//!
//! ## Error handling
//! - Functions that can fail return a `c_int` (0 = success, non-zero = error).
//! - Error details can be retrieved via `mdpdf_last_error`.
//!
//! ## Thread safety
//! - `mdpdf_last_error` uses a thread-local, so it is safe to call from
//!   multiple threads.
//! - Every export call drives its own single-threaded tokio runtime.
//!
//! ## Usage from Go (cgo)
//! ```go
//! // #cgo LDFLAGS: -lmarkdown_pdf
//! // #include <stdint.h>
//! // extern int mdpdf_generate_pdf(const uint8_t* md, uint32_t md_len,
//! //                               const char* options_json,
//! //                               uint8_t** out_buf, uint32_t* out_len);
//! // extern void mdpdf_free_buffer(uint8_t* buf, uint32_t len);
//! // extern const char* mdpdf_last_error();
//! import "C"
//! ```

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::ptr;
use std::slice;

use crate::api::render;
use crate::dom::{ElementNode, Tag};
use crate::export::download;
use crate::markdown::{configure_marked, ParserOverrides};
use crate::options::Options;
use crate::page::{DownloadTarget, Page};

/// Null pointer passed where a value is required.
pub const MDPDF_ERR_NULL: c_int = 1;
/// Input bytes are not valid UTF-8.
pub const MDPDF_ERR_UTF8: c_int = 2;
/// Options or overrides JSON failed to parse.
pub const MDPDF_ERR_OPTIONS: c_int = 3;
/// Rendering or export failed.
pub const MDPDF_ERR_EXPORT: c_int = 4;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg.replace('\0', " ")).ok();
    });
}

fn fail(code: c_int, msg: &str) -> c_int {
    log::debug!("ffi call failed ({code}): {msg}");
    set_last_error(msg);
    code
}

/// Borrow `len` bytes at `ptr` as UTF-8. A null pointer with zero length is
/// the empty string.
///
/// # Safety
/// `ptr` must point to `len` valid bytes, or be null.
unsafe fn read_utf8<'a>(ptr: *const u8, len: u32) -> Result<&'a str, c_int> {
    if ptr.is_null() {
        return if len == 0 {
            Ok("")
        } else {
            Err(fail(MDPDF_ERR_NULL, "Null pointer argument"))
        };
    }
    let bytes = slice::from_raw_parts(ptr, len as usize);
    std::str::from_utf8(bytes).map_err(|e| fail(MDPDF_ERR_UTF8, &format!("Invalid UTF-8: {e}")))
}

/// # Safety
/// `ptr`, if non-null, must point to a valid null-terminated string.
unsafe fn read_c_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>, c_int> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(Some)
        .map_err(|e| fail(MDPDF_ERR_UTF8, &format!("Invalid UTF-8: {e}")))
}

/// # Safety
/// Same as [`read_c_str`].
unsafe fn read_options(json: *const c_char) -> Result<Options, c_int> {
    match read_c_str(json)? {
        None => Ok(Options::default()),
        Some(s) if s.trim().is_empty() => Ok(Options::default()),
        Some(s) => Options::from_json(s)
            .map_err(|e| fail(MDPDF_ERR_OPTIONS, &format!("Invalid options JSON: {e}"))),
    }
}

fn export_to(page: &Page, markdown: &str, options: &Options) -> Result<(), c_int> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| fail(MDPDF_ERR_EXPORT, &format!("Failed to start runtime: {e}")))?;
    runtime
        .block_on(download(page, Some(markdown), options))
        .map_err(|e| fail(MDPDF_ERR_EXPORT, &e.to_string()))
}

macro_rules! try_ffi {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(code) => return code,
        }
    };
}

// ---------------------------------------------------------------------------
// Core API
// ---------------------------------------------------------------------------

/// Render markdown into the document element and return it as HTML.
///
/// # Parameters
/// - `md_ptr`, `md_len`: UTF-8 markdown (not necessarily null-terminated)
/// - `options_json`: null-terminated JSON options, or `NULL`
/// - `out_html`: on success, receives a null-terminated HTML string
///
/// # Returns
/// `0` on success, non-zero on error. On error, call `mdpdf_last_error`.
///
/// # Safety
/// - `md_ptr` must point to `md_len` valid bytes.
/// - `options_json` must be null or a valid C string.
/// - `out_html` must be a valid pointer. Free `*out_html` with `mdpdf_free_string`.
#[no_mangle]
pub unsafe extern "C" fn mdpdf_render_html(
    md_ptr: *const u8,
    md_len: u32,
    options_json: *const c_char,
    out_html: *mut *mut c_char,
) -> c_int {
    if out_html.is_null() {
        return fail(MDPDF_ERR_NULL, "Null pointer argument");
    }
    let markdown = try_ffi!(read_utf8(md_ptr, md_len));
    let options = try_ffi!(read_options(options_json));

    let mut container = ElementNode::new(Tag::Div);
    let html = match render(Some(markdown), Some(&mut container), &options) {
        Ok(element) => element.outer_html(),
        Err(e) => return fail(MDPDF_ERR_EXPORT, &e.to_string()),
    };
    match CString::new(html) {
        Ok(cs) => {
            *out_html = cs.into_raw();
            0
        }
        Err(e) => fail(MDPDF_ERR_EXPORT, &format!("HTML contains a NUL byte: {e}")),
    }
}

/// Export markdown as a PDF held in memory.
///
/// # Parameters
/// - `md_ptr`, `md_len`: UTF-8 markdown
/// - `options_json`: null-terminated JSON options, or `NULL`
/// - `out_buf`: on success, receives a pointer to heap-allocated PDF bytes
/// - `out_len`: on success, receives the length of the PDF buffer
///
/// # Returns
/// `0` on success, non-zero on error. On error, call `mdpdf_last_error`.
///
/// # Safety
/// - `md_ptr` must point to `md_len` valid bytes.
/// - `out_buf` and `out_len` must be valid pointers.
/// - The caller must free `*out_buf` by calling `mdpdf_free_buffer`.
#[no_mangle]
pub unsafe extern "C" fn mdpdf_generate_pdf(
    md_ptr: *const u8,
    md_len: u32,
    options_json: *const c_char,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    if out_buf.is_null() || out_len.is_null() {
        return fail(MDPDF_ERR_NULL, "Null pointer argument");
    }
    let markdown = try_ffi!(read_utf8(md_ptr, md_len));
    let options = try_ffi!(read_options(options_json));

    let page = Page::in_memory();
    try_ffi!(export_to(&page, markdown, &options));

    let Some(saved) = page.last_download() else {
        return fail(MDPDF_ERR_EXPORT, "Failed to generate PDF");
    };
    let len = saved.bytes.len() as u32;
    let raw = Box::into_raw(saved.bytes.into_boxed_slice()) as *mut u8;
    *out_buf = raw;
    *out_len = len;
    0
}

/// Export markdown as a PDF written to `out_dir`, under the `filename`
/// option (default `document.pdf`).
///
/// # Safety
/// - `md_ptr` must point to `md_len` valid bytes.
/// - `options_json` must be null or a valid C string.
/// - `out_dir` must be a valid C string naming an existing directory.
#[no_mangle]
pub unsafe extern "C" fn mdpdf_download(
    md_ptr: *const u8,
    md_len: u32,
    options_json: *const c_char,
    out_dir: *const c_char,
) -> c_int {
    let markdown = try_ffi!(read_utf8(md_ptr, md_len));
    let options = try_ffi!(read_options(options_json));
    let dir = match try_ffi!(read_c_str(out_dir)) {
        Some(dir) => dir,
        None => return fail(MDPDF_ERR_NULL, "Null pointer argument"),
    };

    let page = Page::new(DownloadTarget::Directory(PathBuf::from(dir)));
    try_ffi!(export_to(&page, markdown, &options));
    0
}

/// Replace the process-wide markdown rules. `overrides_json` is an object
/// such as `{"breaks": true}`; `NULL` restores the baseline rules.
///
/// # Safety
/// `overrides_json` must be null or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn mdpdf_configure_parser(overrides_json: *const c_char) -> c_int {
    let overrides = match try_ffi!(read_c_str(overrides_json)) {
        None => ParserOverrides::default(),
        Some(s) => match serde_json::from_str::<ParserOverrides>(s) {
            Ok(o) => o,
            Err(e) => return fail(MDPDF_ERR_OPTIONS, &format!("Invalid parser JSON: {e}")),
        },
    };
    configure_marked(&overrides);
    0
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a PDF buffer returned by `mdpdf_generate_pdf`.
///
/// # Safety
/// `buf` must have been returned by a previous `mdpdf_generate_pdf` call, and
/// `len` must be the corresponding length.
#[no_mangle]
pub unsafe extern "C" fn mdpdf_free_buffer(buf: *mut u8, len: u32) {
    if !buf.is_null() {
        let _ = Box::from_raw(slice::from_raw_parts_mut(buf, len as usize));
    }
}

/// Free a string returned by `mdpdf_render_html`.
///
/// # Safety
/// `s` must have been returned by Rust's `CString::into_raw`.
#[no_mangle]
pub unsafe extern "C" fn mdpdf_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

/// Retrieve the last error message. Returns a null-terminated string.
///
/// The returned pointer is valid until the next failing `mdpdf_*` call on the
/// same thread. The caller should **not** free this pointer.
///
/// Returns null if no error has occurred.
#[no_mangle]
pub extern "C" fn mdpdf_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        let borrow = e.borrow();
        match borrow.as_ref() {
            Some(cs) => cs.as_ptr(),
            None => ptr::null(),
        }
    })
}

/// Return the library version as a null-terminated string.
/// The caller must **not** free this pointer.
#[no_mangle]
pub extern "C" fn mdpdf_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}
