use crate::models::DashboardSummary;

pub fn render_index(summary: &DashboardSummary, window_hours: i64) -> String {
    INDEX_HTML
        .replace("{{WINDOW_HOURS}}", &window_hours.to_string())
        .replace("{{TOTAL_VISITORS}}", &summary.total_visitors.to_string())
        .replace("{{ACTIVE_USERS}}", &summary.active_users.to_string())
        .replace("{{PAGE_VIEWS}}", &summary.total_page_views.to_string())
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Visit Ledger</title>
  <style>
    :root {
      --bg: #f4f6fb;
      --ink: #1f2933;
      --muted: #6b7280;
      --accent: #2563eb;
      --danger: #dc2626;
      --card: #ffffff;
      --line: rgba(31, 41, 51, 0.08);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      background: var(--bg);
      color: var(--ink);
      font-family: "Inter", "Segoe UI", sans-serif;
      padding: 32px 18px 48px;
    }

    main {
      width: min(1040px, 100%);
      margin: 0 auto;
      display: grid;
      gap: 24px;
    }

    header {
      display: flex;
      flex-wrap: wrap;
      justify-content: space-between;
      align-items: center;
      gap: 12px;
    }

    h1 {
      margin: 0;
      font-size: 1.6rem;
    }

    h2 {
      margin: 0 0 12px;
      font-size: 1.1rem;
    }

    .cards {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
      gap: 16px;
    }

    .card {
      background: var(--card);
      border: 1px solid var(--line);
      border-radius: 12px;
      padding: 20px;
    }

    .card .label {
      display: block;
      color: var(--muted);
      font-size: 0.85rem;
    }

    .card .value {
      display: block;
      font-size: 2rem;
      font-weight: 700;
      color: var(--accent);
    }

    table {
      width: 100%;
      border-collapse: collapse;
    }

    th, td {
      text-align: left;
      padding: 10px 6px;
      border-bottom: 1px solid var(--line);
      font-size: 0.92rem;
    }

    button {
      border: none;
      border-radius: 8px;
      padding: 10px 16px;
      font-weight: 600;
      cursor: pointer;
      background: var(--accent);
      color: white;
    }

    button.danger {
      background: var(--danger);
    }

    .status {
      min-height: 1.2em;
      color: var(--muted);
      font-size: 0.9rem;
    }
  </style>
</head>
<body>
  <main>
    <header>
      <h1>Admin Dashboard</h1>
      <div>
        <button id="refresh" type="button">Refresh Data</button>
        <button id="reset" class="danger" type="button">Reset History</button>
      </div>
    </header>
    <p class="status" id="status"></p>

    <section class="cards">
      <div class="card">
        <span class="label">Total Visitors</span>
        <span class="value" id="total-visitors">{{TOTAL_VISITORS}}</span>
      </div>
      <div class="card">
        <span class="label">Active Users ({{WINDOW_HOURS}}h)</span>
        <span class="value" id="active-users">{{ACTIVE_USERS}}</span>
      </div>
      <div class="card">
        <span class="label">Total Page Views</span>
        <span class="value" id="page-views">{{PAGE_VIEWS}}</span>
      </div>
    </section>

    <section class="card">
      <h2>Recent Visits</h2>
      <table>
        <thead><tr><th>Email</th><th>Page</th><th>Date &amp; Time</th></tr></thead>
        <tbody id="recent"></tbody>
      </table>
    </section>

    <section class="card">
      <h2>Visits per Page</h2>
      <table>
        <thead><tr><th>Page</th><th>Visits</th></tr></thead>
        <tbody id="pages"></tbody>
      </table>
    </section>

    <section class="card">
      <h2>Users</h2>
      <table>
        <thead><tr><th>Email</th><th>Visits</th><th>Last Page</th><th>Last Visit</th></tr></thead>
        <tbody id="users"></tbody>
      </table>
    </section>
  </main>

  <script>
    const REFRESH_MS = 30000;
    const statusEl = document.getElementById('status');

    const setStatus = (text) => {
      statusEl.textContent = text;
    };

    const formatTime = (iso) => (iso ? new Date(iso).toLocaleString() : '');

    const fillRows = (tbodyId, rows) => {
      const tbody = document.getElementById(tbodyId);
      tbody.replaceChildren();
      rows.forEach((cells) => {
        const tr = document.createElement('tr');
        cells.forEach((cell) => {
          const td = document.createElement('td');
          td.textContent = String(cell);
          tr.appendChild(td);
        });
        tbody.appendChild(tr);
      });
    };

    const getJson = async (url) => {
      const res = await fetch(url);
      if (!res.ok) {
        throw new Error(`Unable to load ${url}`);
      }
      return res.json();
    };

    const refresh = async () => {
      const [summary, users] = await Promise.all([
        getJson('/api/summary'),
        getJson('/api/users')
      ]);
      document.getElementById('total-visitors').textContent = summary.total_visitors;
      document.getElementById('active-users').textContent = summary.active_users;
      document.getElementById('page-views').textContent = summary.total_page_views;
      fillRows('recent', summary.recent_visits.map((v) => [v.email, v.page, formatTime(v.timestamp)]));
      fillRows('pages', Object.entries(summary.page_visit_counts));
      fillRows('users', users.map((u) => [u.email, u.visit_count, u.last_page || '', formatTime(u.last_visit)]));
      setStatus(`Updated ${new Date().toLocaleTimeString()}`);
    };

    const reset = async () => {
      if (!window.confirm('Are you sure you want to reset all visit history?')) {
        return;
      }
      const res = await fetch('/api/visits', { method: 'DELETE' });
      if (!res.ok) {
        throw new Error((await res.text()) || 'Reset failed');
      }
      await refresh();
    };

    document.getElementById('refresh').addEventListener('click', () => {
      refresh().catch((err) => setStatus(err.message));
    });
    document.getElementById('reset').addEventListener('click', () => {
      reset().catch((err) => setStatus(err.message));
    });

    refresh().catch((err) => setStatus(err.message));
    setInterval(() => refresh().catch((err) => setStatus(err.message)), REFRESH_MS);
  </script>
</body>
</html>
"#;
