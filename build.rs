//! Build script to embed Windows resource metadata into the launcher executable
//! This sets the application name shown in Task Manager

fn main() {
    #[cfg(windows)]
    {
        let mut res = winresource::WindowsResource::new();

        res.set("ProductName", "PDF Toolbox");
        res.set("CompanyName", "PDF Toolbox");
        res.set("ProductVersion", env!("CARGO_PKG_VERSION"));
        res.set("FileVersion", env!("CARGO_PKG_VERSION"));
        res.set("FileDescription", "PDF Toolbox Launcher");
        res.set("InternalName", "PDFToolbox");
        res.set("OriginalFilename", "pdf_toolbox.exe");

        if let Err(e) = res.compile() {
            eprintln!("Warning: Failed to compile Windows resources: {}", e);
        }
    }
}
