/// Single-page HUD: camera preview, latest overlay, hazard banner, and the
/// Start Camera / Detect / Switch Mode controls.
pub const HUD_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Hazard Watch</title>
<style>
  :root { color-scheme: dark; }
  body {
    margin: 0;
    font-family: "Segoe UI", Roboto, sans-serif;
    background: #101418;
    color: #e6e9ec;
  }
  header { padding: 16px 24px; border-bottom: 1px solid #263038; }
  h1 { margin: 0; font-size: 1.4rem; }
  #banner {
    margin: 16px 24px;
    padding: 12px 16px;
    border-radius: 6px;
    font-weight: 600;
    background: #1f2a33;
  }
  #banner.alert { background: #7a1d1d; }
  .controls { display: flex; gap: 12px; padding: 0 24px; }
  button {
    padding: 10px 18px;
    border: none;
    border-radius: 4px;
    background: #2d6cdf;
    color: #fff;
    font-size: 0.95rem;
    cursor: pointer;
  }
  button:disabled { background: #3a4650; cursor: progress; }
  .views {
    display: grid;
    grid-template-columns: repeat(auto-fit, minmax(320px, 1fr));
    gap: 16px;
    padding: 16px 24px;
  }
  figure { margin: 0; }
  figcaption { font-size: 0.8rem; color: #8b98a5; margin-bottom: 6px; }
  img { width: 100%; background: #000; min-height: 180px; border-radius: 4px; }
  #error { color: #ff8a80; padding: 0 24px; min-height: 1.2em; }
</style>
</head>
<body>
<header><h1 id="headline">Live Fire Detection</h1></header>
<div id="banner">No Hazard</div>
<div class="controls">
  <button id="start">Start Camera</button>
  <button id="detect">Detect</button>
  <button id="mode">Switch Mode</button>
</div>
<p id="error"></p>
<div class="views">
  <figure>
    <figcaption>Live preview</figcaption>
    <img id="preview" alt="camera preview">
  </figure>
  <figure>
    <figcaption>Detection overlay</figcaption>
    <img id="overlay" alt="detection overlay">
  </figure>
</div>
<script>
  const $ = (id) => document.getElementById(id);

  function render(status) {
    $("headline").textContent = status.headline;
    $("banner").textContent = status.status;
    $("banner").classList.toggle("alert", status.status !== "No Hazard");
    if (status.camera_running && !$("preview").src) {
      $("preview").src = "/stream.mjpg";
    }
  }

  async function call(method, url) {
    const resp = await fetch(url, { method });
    const body = await resp.json().catch(() => ({}));
    if (!resp.ok) {
      throw new Error(body.message || resp.statusText);
    }
    return body;
  }

  async function refresh() {
    try {
      render(await call("GET", "/status"));
    } catch (err) {
      $("error").textContent = err.message;
    }
  }

  async function action(button, work) {
    button.disabled = true;
    $("error").textContent = "";
    try {
      await work();
    } catch (err) {
      $("error").textContent = err.message;
    } finally {
      button.disabled = false;
      await refresh();
    }
  }

  $("start").onclick = () => action($("start"), async () => {
    await call("POST", "/camera/start");
    $("preview").src = "/stream.mjpg";
  });

  $("detect").onclick = () => action($("detect"), async () => {
    await call("POST", "/detect");
    $("overlay").src = "/overlay.jpg?t=" + Date.now();
  });

  $("mode").onclick = () => action($("mode"), () => call("POST", "/mode/next"));

  refresh();
</script>
</body>
</html>
"#;
