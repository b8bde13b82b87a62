use droopy::utils::{client_basename, href_encode, html_escape, is_temp_name, split_extension};

#[test]
fn test_client_basename() {
    assert_eq!(client_basename("report.pdf"), "report.pdf");

    // posix, windows and classic mac / drive separators
    assert_eq!(client_basename("/home/bob/report.pdf"), "report.pdf");
    assert_eq!(client_basename("C:\\Users\\bob\\report.pdf"), "report.pdf");
    assert_eq!(client_basename("Macintosh HD:Desktop:report.pdf"), "report.pdf");
    assert_eq!(client_basename("C:report.pdf"), "report.pdf");

    // directory traversal attempts
    assert_eq!(client_basename("../../etc/passwd"), "passwd");
    assert_eq!(client_basename(".."), "");
    assert_eq!(client_basename("foo/.."), "");
    assert_eq!(client_basename("foo/."), "");
    assert_eq!(client_basename("foo/"), "");
    assert_eq!(client_basename(""), "");

    // dots inside names survive
    assert_eq!(client_basename("...txt"), "...txt");
}

#[test]
fn test_split_extension() {
    assert_eq!(split_extension("report.pdf"), ("report", ".pdf"));
    assert_eq!(split_extension("a.tar.gz"), ("a.tar", ".gz"));
    assert_eq!(split_extension("README"), ("README", ""));
    assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
    assert_eq!(split_extension(".config.json"), (".config", ".json"));
}

#[test]
fn test_escaping() {
    assert_eq!(
        html_escape(r#"<a href="x">'&'</a>"#),
        "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;"
    );
    assert_eq!(href_encode("my file #1.txt"), "my%20file%20%231.txt");
    assert_eq!(href_encode("déjà-vu_~.txt"), "d%C3%A9j%C3%A0-vu_~.txt");
}

#[test]
fn test_is_temp_name() {
    assert!(is_temp_name("tmpdroopy1234"));
    assert!(!is_temp_name("report.pdf"));
    assert!(!is_temp_name("xtmpdroopy"));
}
